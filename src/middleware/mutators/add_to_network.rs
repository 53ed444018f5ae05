use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::docker::MetadataStore;
use crate::middleware::config::require;
use crate::middleware::{Method, MiddlewareError, Mutator, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "addToNetwork";

#[derive(Debug, Deserialize)]
struct AddToNetworkSettings {
    networks: Option<Vec<String>>,
}

/// 새 컨테이너를 설정된 네트워크에 모두 연결합니다.
pub struct AddToNetworkMutator {
    networks: Vec<String>,
}

impl AddToNetworkMutator {
    pub fn new(networks: Vec<String>) -> Result<Self, MiddlewareError> {
        if networks.is_empty() {
            return Err(MiddlewareError::Config("'networks' must not be empty".to_string()));
        }
        Ok(Self { networks })
    }
}

/// 객체 필드를 꺼내고, 없거나 null이면 빈 객체로 채웁니다.
fn object_field<'a>(parent: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Map<String, Value>, MiddlewareError> {
    let field = parent.entry(key).or_insert(Value::Null);
    if field.is_null() {
        *field = Value::Object(Map::new());
    }
    field.as_object_mut()
        .ok_or_else(|| MiddlewareError::InvalidBody(format!("{}는 객체여야 합니다", key)))
}

impl Unit for AddToNetworkMutator {
    fn name(&self) -> &'static str {
        "AddToNetworkMutator"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/containers/create")
    }

    fn describe(&self) -> String {
        format!(
            "AddToNetworkMutator - adding all containers to the networks: {}",
            self.networks.join(", ")
        )
    }
}

#[async_trait]
impl Mutator for AddToNetworkMutator {
    async fn run(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        let body = request.body_object_mut()?;

        let network_mode = body.get("HostConfig")
            .and_then(|host| host.get("NetworkMode"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if network_mode == "host" || network_mode == "none" || network_mode.starts_with("container:") {
            warn!(network_mode = %network_mode, "이 네트워크 모드에는 네트워크를 추가할 수 없어 건너뜁니다");
            return Ok(());
        }

        let reset_endpoints = network_mode.is_empty() || network_mode == "default";
        if reset_endpoints {
            let host_config = object_field(body, "HostConfig")?;
            host_config.insert("NetworkMode".to_string(), Value::String(self.networks[0].clone()));
        }

        let networking = object_field(body, "NetworkingConfig")?;
        if reset_endpoints {
            networking.insert("EndpointsConfig".to_string(), Value::Object(Map::new()));
        }
        let endpoints = object_field(networking, "EndpointsConfig")?;

        for network in &self.networks {
            endpoints.entry(network.clone()).or_insert_with(|| Value::Object(Map::new()));
        }

        Ok(())
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Mutator>, MiddlewareError> {
    let settings: AddToNetworkSettings = config.parse()?;
    Ok(Arc::new(AddToNetworkMutator::new(require(settings.networks, "networks")?)?))
}
