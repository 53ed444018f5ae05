//! 유닛 타입 태그와 생성자를 잇는 정적 등록 테이블

use std::collections::HashMap;
use std::sync::Arc;

use crate::docker::MetadataStore;
use super::filters::label_filter;
use super::gates::{image_loading, mount_source, namespace_allowlist, readonly_access, registry as registry_gate};
use super::mutators::{add_labels, add_to_network, mount_path, remap_image};
use super::{Gate, MiddlewareError, Mutator, ResponseFilter, UnitConfig};

/// 설정 항목 하나로 유닛을 만드는 생성자
pub type Constructor<T> = fn(&UnitConfig, &Arc<dyn MetadataStore>) -> Result<Arc<T>, MiddlewareError>;

pub type GateConstructor = Constructor<dyn Gate>;
pub type MutatorConstructor = Constructor<dyn Mutator>;
pub type ResponseFilterConstructor = Constructor<dyn ResponseFilter>;

const GATES: &[(&str, GateConstructor)] = &[
    (image_loading::KEY, image_loading::construct),
    (mount_source::KEY, mount_source::construct),
    (namespace_allowlist::KEY, namespace_allowlist::construct),
    (readonly_access::KEY, readonly_access::construct),
    (registry_gate::KEY, registry_gate::construct),
];

const MUTATORS: &[(&str, MutatorConstructor)] = &[
    (add_labels::KEY, add_labels::construct),
    (add_to_network::KEY, add_to_network::construct),
    (mount_path::KEY, mount_path::construct),
    (remap_image::KEY, remap_image::construct),
];

const RESPONSE_FILTERS: &[(&str, ResponseFilterConstructor)] = &[
    (label_filter::KEY, label_filter::construct),
];

/// 역할별 타입 태그 -> 생성자 매핑. 부트스트랩 이후에는 읽기 전용입니다.
#[derive(Clone, Default)]
pub struct Registry {
    gates: HashMap<&'static str, GateConstructor>,
    mutators: HashMap<&'static str, MutatorConstructor>,
    response_filters: HashMap<&'static str, ResponseFilterConstructor>,
}

impl Registry {
    /// 내장 유닛이 모두 등록된 레지스트리
    pub fn builtin() -> Result<Self, MiddlewareError> {
        let mut registry = Self::default();
        for (key, construct) in GATES {
            registry.register_gate(*key, *construct)?;
        }
        for (key, construct) in MUTATORS {
            registry.register_mutator(*key, *construct)?;
        }
        for (key, construct) in RESPONSE_FILTERS {
            registry.register_response_filter(*key, *construct)?;
        }
        Ok(registry)
    }

    pub fn register_gate(&mut self, key: &'static str, construct: GateConstructor) -> Result<(), MiddlewareError> {
        insert_unique(&mut self.gates, "gate", key, construct)
    }

    pub fn register_mutator(&mut self, key: &'static str, construct: MutatorConstructor) -> Result<(), MiddlewareError> {
        insert_unique(&mut self.mutators, "mutator", key, construct)
    }

    pub fn register_response_filter(
        &mut self,
        key: &'static str,
        construct: ResponseFilterConstructor,
    ) -> Result<(), MiddlewareError> {
        insert_unique(&mut self.response_filters, "response filter", key, construct)
    }

    pub fn gate(&self, key: &str) -> Option<GateConstructor> {
        self.gates.get(key).copied()
    }

    pub fn mutator(&self, key: &str) -> Option<MutatorConstructor> {
        self.mutators.get(key).copied()
    }

    pub fn response_filter(&self, key: &str) -> Option<ResponseFilterConstructor> {
        self.response_filters.get(key).copied()
    }
}

fn insert_unique<C>(
    table: &mut HashMap<&'static str, C>,
    role: &str,
    key: &'static str,
    construct: C,
) -> Result<(), MiddlewareError> {
    if key.trim().is_empty() {
        return Err(MiddlewareError::Config(format!("{} 유닛의 타입 태그가 비어 있습니다", role)));
    }
    if table.insert(key, construct).is_some() {
        return Err(MiddlewareError::Config(format!("{} 타입 태그 중복: {}", role, key)));
    }
    Ok(())
}
