use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::docker::MetadataStore;
use crate::middleware::{Gate, GateOutcome, Method, MiddlewareError, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "mountSource";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MountSourceSettings {
    allowed_sources: Option<Vec<String>>,
    /// 이 라벨을 모두 가진 볼륨은 목록에 없어도 마운트를 허용
    allowed_volume_labels: Option<BTreeMap<String, String>>,
}

/// 컨테이너 생성 시 bind/mount 소스가 허용 목록에 있는지 검사합니다.
pub struct MountSourceGate {
    allowed_sources: Vec<String>,
    allowed_volume_labels: Option<BTreeMap<String, String>>,
    metadata: Arc<dyn MetadataStore>,
}

impl MountSourceGate {
    pub fn new(
        allowed_sources: Vec<String>,
        allowed_volume_labels: Option<BTreeMap<String, String>>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self { allowed_sources, allowed_volume_labels, metadata }
    }

    /// 요청 본문에서 모든 마운트 소스를 꺼냅니다.
    fn requested_sources(body: &Value) -> Result<Vec<String>, MiddlewareError> {
        let mut sources = Vec::new();
        let Some(host_config) = body.get("HostConfig").filter(|v| !v.is_null()) else {
            return Ok(sources);
        };

        if let Some(binds) = host_config.get("Binds").and_then(Value::as_array) {
            for bind in binds {
                let bind = bind.as_str()
                    .ok_or_else(|| MiddlewareError::InvalidBody("HostConfig.Binds 항목은 문자열이어야 합니다".to_string()))?;
                let source = bind.split(':').next().unwrap_or(bind);
                sources.push(source.to_string());
            }
        }

        if let Some(mounts) = host_config.get("Mounts").and_then(Value::as_array) {
            for mount in mounts {
                // tmpfs 같은 마운트는 소스가 없음
                if let Some(source) = mount.get("Source").and_then(Value::as_str) {
                    if !source.is_empty() {
                        sources.push(source.to_string());
                    }
                }
            }
        }

        Ok(sources)
    }
}

impl Unit for MountSourceGate {
    fn name(&self) -> &'static str {
        "MountSourceGate"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/containers/create")
    }

    fn describe(&self) -> String {
        format!(
            "MountSourceGate - allowing mounts from the following sources: {}; volume labels: {:?}",
            self.allowed_sources.join(", "),
            self.allowed_volume_labels
        )
    }
}

#[async_trait]
impl Gate for MountSourceGate {
    async fn run(&self, request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        let Some(body) = request.body.as_ref() else {
            return Ok(GateOutcome::Allowed);
        };

        let mut blocked: Vec<String> = Self::requested_sources(body)?
            .into_iter()
            .filter(|source| !self.allowed_sources.contains(source))
            .collect();

        if blocked.is_empty() {
            return Ok(GateOutcome::Allowed);
        }

        // 목록 밖의 소스가 있을 때만 엔진에 라벨 조회
        if let Some(labels) = &self.allowed_volume_labels {
            let volumes = self.metadata.volumes_for_labels(labels).await?;
            blocked.retain(|source| !volumes.contains(source));
        }

        match blocked.first() {
            Some(source) => Ok(GateOutcome::denied(format!("Mounting {} is not allowed", source))),
            None => Ok(GateOutcome::Allowed),
        }
    }
}

pub fn construct(config: &UnitConfig, metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Gate>, MiddlewareError> {
    let settings: MountSourceSettings = config.parse()?;
    if settings.allowed_sources.is_none() && settings.allowed_volume_labels.is_none() {
        return Err(MiddlewareError::missing("allowedSources"));
    }

    Ok(Arc::new(MountSourceGate::new(
        settings.allowed_sources.unwrap_or_default(),
        settings.allowed_volume_labels,
        metadata.clone(),
    )))
}
