use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::docker::MetadataStore;
use super::registry::Constructor;
use super::{Gate, Method, MiddlewareChain, MiddlewareError, Mutator, PolicyConfig, Registry, ResponseFilter, UnitConfig, Url};

/// 설정된 유닛 전체를 보관하고 요청마다 체인을 만듭니다.
///
/// 부트스트랩 이후에는 변경되지 않으므로 동기화 없이 여러 연결에서 공유합니다.
#[derive(Default, Clone)]
pub struct MiddlewareManager {
    gates: Vec<Arc<dyn Gate>>,
    mutators: Vec<Arc<dyn Mutator>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
}

impl MiddlewareManager {
    /// 내장 레지스트리로 유닛을 생성합니다.
    pub fn bootstrap(config: &PolicyConfig, metadata: Arc<dyn MetadataStore>) -> Result<Self, MiddlewareError> {
        Self::with_registry(&Registry::builtin()?, config, metadata)
    }

    /// 알 수 없는 타입 태그는 경고 후 건너뛰고, 생성 실패는 부트스트랩 오류입니다.
    pub fn with_registry(
        registry: &Registry,
        config: &PolicyConfig,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<Self, MiddlewareError> {
        let manager = Self {
            gates: build_units(&config.gates, "gate", |key| registry.gate(key), &metadata)?,
            mutators: build_units(&config.mutators, "mutator", |key| registry.mutator(key), &metadata)?,
            response_filters: build_units(
                &config.response_filters,
                "response filter",
                |key| registry.response_filter(key),
                &metadata,
            )?,
        };

        manager.log_configuration();
        Ok(manager)
    }

    /// 요청에 적용되는 유닛만 설정 순서대로 골라 체인을 만듭니다.
    pub fn create_chain(&self, method: &Method, url: &Url) -> MiddlewareChain {
        MiddlewareChain::new(
            self.gates.iter().filter(|g| g.applies(method, url)).cloned().collect(),
            self.mutators.iter().filter(|m| m.applies(method, url)).cloned().collect(),
            self.response_filters.iter().filter(|f| f.applies(method, url)).cloned().collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty() && self.mutators.is_empty() && self.response_filters.is_empty()
    }

    pub fn describe(&self) -> Vec<String> {
        self.gates.iter().map(|g| g.describe())
            .chain(self.mutators.iter().map(|m| m.describe()))
            .chain(self.response_filters.iter().map(|f| f.describe()))
            .collect()
    }

    fn log_configuration(&self) {
        info!(
            gates = self.gates.len(),
            mutators = self.mutators.len(),
            response_filters = self.response_filters.len(),
            "미들웨어 구성 완료"
        );
        for description in self.describe() {
            info!("  {}", description);
        }
    }
}

fn build_units<T: ?Sized>(
    entries: &[UnitConfig],
    role: &str,
    lookup: impl Fn(&str) -> Option<Constructor<T>>,
    metadata: &Arc<dyn MetadataStore>,
) -> Result<Vec<Arc<T>>, MiddlewareError> {
    let mut units = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(construct) = lookup(&entry.unit_type) else {
            warn!(role = role, unit_type = %entry.unit_type, "알 수 없는 유닛 타입, 건너뜁니다");
            continue;
        };

        debug!(role = role, unit_type = %entry.unit_type, "유닛 생성");
        let unit = construct(entry, metadata).map_err(|e| {
            MiddlewareError::Config(format!("{} '{}' 생성 실패: {}", role, entry.unit_type, e))
        })?;
        units.push(unit);
    }

    Ok(units)
}
