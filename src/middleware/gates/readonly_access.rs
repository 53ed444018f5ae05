use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::docker::MetadataStore;
use crate::middleware::context::path_ends_with_any;
use crate::middleware::{Gate, GateOutcome, Method, MiddlewareError, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "readonlyAccess";

#[derive(Debug, Default, Deserialize)]
struct ReadonlySettings {
    #[serde(default)]
    allowed: Vec<String>,
}

/// 상태를 바꾸는 메서드(POST, PUT, DELETE)를 차단합니다.
///
/// `allowed`에 나열된 경로 접미사로 끝나는 요청은 예외입니다.
pub struct ReadonlyAccessGate {
    allowed: Vec<String>,
}

impl ReadonlyAccessGate {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl Unit for ReadonlyAccessGate {
    fn name(&self) -> &'static str {
        "ReadonlyAccessGate"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        let mutating = method == Method::POST || method == Method::PUT || method == Method::DELETE;
        let suffixes: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        mutating && !path_ends_with_any(url, &suffixes)
    }

    fn describe(&self) -> String {
        if self.allowed.is_empty() {
            "ReadonlyAccessGate - blocking all write requests".to_string()
        } else {
            format!("ReadonlyAccessGate - blocking write requests except {}", self.allowed.join(", "))
        }
    }
}

#[async_trait]
impl Gate for ReadonlyAccessGate {
    async fn run(&self, _request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        Ok(GateOutcome::denied("Read-only access is enabled"))
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Gate>, MiddlewareError> {
    let settings: ReadonlySettings = config.parse()?;
    Ok(Arc::new(ReadonlyAccessGate::new(settings.allowed)))
}
