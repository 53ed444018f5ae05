use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::requested_pull_image;
use crate::docker::MetadataStore;
use crate::middleware::config::require;
use crate::middleware::{Gate, GateOutcome, Method, MiddlewareError, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "registry";

#[derive(Debug, Deserialize)]
struct RegistrySettings {
    registries: Option<Vec<String>>,
}

/// 허용된 레지스트리에서만 이미지를 pull 할 수 있습니다.
pub struct RegistryGate {
    registries: Vec<String>,
}

impl RegistryGate {
    pub fn new(registries: Vec<String>) -> Self {
        Self { registries }
    }
}

impl Unit for RegistryGate {
    fn name(&self) -> &'static str {
        "RegistryGate"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/images/create")
    }

    fn describe(&self) -> String {
        format!(
            "RegistryGate - allowing pulls from the following registries: {}",
            self.registries.join(", ")
        )
    }
}

#[async_trait]
impl Gate for RegistryGate {
    async fn run(&self, request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        let image = match requested_pull_image(&request.url) {
            Ok(image) => image,
            Err(reason) => return Ok(GateOutcome::Denied(reason)),
        };

        if self.registries.contains(&image.domain) {
            Ok(GateOutcome::Allowed)
        } else {
            Ok(GateOutcome::denied(format!("Access to registry {} is forbidden", image.domain)))
        }
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Gate>, MiddlewareError> {
    let settings: RegistrySettings = config.parse()?;
    Ok(Arc::new(RegistryGate::new(require(settings.registries, "registries")?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(gate: &RegistryGate, path: &str) -> GateOutcome {
        let request = RequestContext::from_path(Method::POST, path, None).unwrap();
        gate.run(&request).await.unwrap()
    }

    #[tokio::test]
    async fn test_denies_unlisted_registry() {
        let gate = RegistryGate::new(vec!["docker.io".to_string()]);
        let outcome = run(&gate, "/images/create?fromImage=quay.io/foo/bar&tag=latest").await;

        match outcome {
            GateOutcome::Denied(reason) => assert!(reason.contains("quay.io")),
            GateOutcome::Allowed => panic!("quay.io 이미지는 거부되어야 합니다"),
        }
    }

    #[tokio::test]
    async fn test_allows_default_registry() {
        let gate = RegistryGate::new(vec!["docker.io".to_string()]);

        assert!(run(&gate, "/images/create?fromImage=nginx&tag=1.25").await.is_allowed());
        assert!(run(&gate, "/images/create?fromImage=index.docker.io/library/nginx").await.is_allowed());
    }

    #[tokio::test]
    async fn test_digest_in_tag_param() {
        let gate = RegistryGate::new(vec!["ghcr.io".to_string()]);
        let outcome = run(&gate, "/images/create?fromImage=ghcr.io/org/app&tag=sha256:abcdef").await;

        assert!(outcome.is_allowed());
    }

    #[test]
    fn test_applies_only_to_pulls() {
        let gate = RegistryGate::new(vec![]);
        let url = crate::middleware::context::parse_request_url("/images/create?fromImage=nginx").unwrap();

        assert!(gate.applies(&Method::POST, &url));
        assert!(!gate.applies(&Method::GET, &url));
    }
}
