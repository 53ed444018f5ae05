use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::requested_pull_image;
use crate::docker::MetadataStore;
use crate::middleware::config::require;
use crate::middleware::{Gate, GateOutcome, Method, MiddlewareError, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "namespaceAllowlist";

#[derive(Debug, Deserialize)]
struct NamespaceSettings {
    namespaces: Option<Vec<String>>,
}

/// 허용된 네임스페이스의 이미지만 pull 할 수 있습니다.
pub struct NamespaceAllowListGate {
    namespaces: Vec<String>,
}

impl NamespaceAllowListGate {
    pub fn new(namespaces: Vec<String>) -> Self {
        Self { namespaces }
    }
}

impl Unit for NamespaceAllowListGate {
    fn name(&self) -> &'static str {
        "NamespaceAllowListGate"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/images/create")
    }

    fn describe(&self) -> String {
        format!(
            "NamespaceAllowListGate - allowing pulls from the following namespaces: {}",
            self.namespaces.join(", ")
        )
    }
}

#[async_trait]
impl Gate for NamespaceAllowListGate {
    async fn run(&self, request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        let image = match requested_pull_image(&request.url) {
            Ok(image) => image,
            Err(reason) => return Ok(GateOutcome::Denied(reason)),
        };

        let namespace = image.namespace();
        if self.namespaces.contains(&namespace) {
            Ok(GateOutcome::Allowed)
        } else {
            Ok(GateOutcome::denied(format!("Access to namespace {} is forbidden", namespace)))
        }
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Gate>, MiddlewareError> {
    let settings: NamespaceSettings = config.parse()?;
    Ok(Arc::new(NamespaceAllowListGate::new(require(settings.namespaces, "namespaces")?)))
}
