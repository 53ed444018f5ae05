use std::sync::Arc;

use async_trait::async_trait;

use crate::docker::MetadataStore;
use crate::middleware::{Gate, GateOutcome, Method, MiddlewareError, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "imageLoading";

/// 이미지 tarball 로드(`POST /images/load`)를 모두 차단합니다.
pub struct ImageLoadingGate;

impl Unit for ImageLoadingGate {
    fn name(&self) -> &'static str {
        "ImageLoadingGate"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST && url.path().ends_with("/images/load")
    }

    fn describe(&self) -> String {
        "ImageLoadingGate - blocking all image loads".to_string()
    }
}

#[async_trait]
impl Gate for ImageLoadingGate {
    async fn run(&self, _request: &RequestContext) -> Result<GateOutcome, MiddlewareError> {
        Ok(GateOutcome::denied("Image loading is blocked"))
    }
}

pub fn construct(_config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Gate>, MiddlewareError> {
    Ok(Arc::new(ImageLoadingGate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::context::parse_request_url;

    #[test]
    fn test_applies() {
        let gate = ImageLoadingGate;
        assert!(gate.applies(&Method::POST, &parse_request_url("/v1.43/images/load").unwrap()));
        assert!(!gate.applies(&Method::GET, &parse_request_url("/images/create").unwrap()));
    }

    #[tokio::test]
    async fn test_blocks_image_loading() {
        let request = RequestContext::from_path(Method::POST, "/images/load", None).unwrap();
        let outcome = ImageLoadingGate.run(&request).await.unwrap();
        assert_eq!(outcome, GateOutcome::denied("Image loading is blocked"));
    }
}
