use std::sync::Arc;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::docker::{ImageReference, MetadataStore};
use crate::middleware::config::require;
use crate::middleware::{Method, MiddlewareError, Mutator, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "remapImage";

const INSPECT_PATTERN: &str = r"/images/(.+)/json$";

#[derive(Debug, Deserialize)]
struct RemapImageSettings {
    from: Option<String>,
    to: Option<String>,
}

/// 특정 이미지 요청을 다른 이미지로 바꿉니다.
///
/// 태그가 없는 `from`은 `latest`와 같으며 다른 태그의 요청과는 일치하지 않습니다.
pub struct RemapImageMutator {
    from: ImageReference,
    to: ImageReference,
    inspect: Regex,
}

impl RemapImageMutator {
    pub fn new(from: &str, to: &str) -> Result<Self, MiddlewareError> {
        let parse = |field: &str, value: &str| {
            ImageReference::parse(value)
                .map_err(|e| MiddlewareError::Config(format!("'{}' 이미지 파싱 실패: {}", field, e)))
        };

        let inspect = Regex::new(INSPECT_PATTERN)
            .map_err(|e| MiddlewareError::Config(format!("정규식 오류: {}", e)))?;

        Ok(Self {
            from: parse("from", from)?,
            to: parse("to", to)?,
            inspect,
        })
    }

    /// 재작성 대상이면 새 이미지 문자열을 반환합니다.
    fn remap(&self, requested: &str) -> Option<String> {
        let requested = ImageReference::parse(requested).ok()?;
        if !requested.matches(&self.from) {
            return None;
        }
        debug!(from = %requested, to = %self.to, "이미지 재작성");
        Some(self.replacement())
    }

    fn replacement(&self) -> String {
        match &self.to.digest {
            Some(digest) => format!("{}@{}", self.to.familiar_name(), digest),
            None => format!("{}:{}", self.to.familiar_name(), self.to.resolved_tag()),
        }
    }

    fn remap_container_create(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        let body = request.body_object_mut()?;
        let Some(image) = body.get("Image").and_then(Value::as_str) else {
            return Ok(());
        };

        if let Some(replacement) = self.remap(image) {
            body.insert("Image".to_string(), Value::String(replacement));
        }
        Ok(())
    }

    fn remap_image_pull(&self, request: &mut RequestContext) {
        let Some(Ok(requested)) = ImageReference::from_pull_params(&request.url) else {
            return;
        };
        if !requested.matches(&self.from) {
            return;
        }

        request.set_query_param("fromImage", &self.to.familiar_name());
        match &self.to.digest {
            Some(digest) => request.set_query_param("tag", digest),
            None => request.set_query_param("tag", self.to.resolved_tag()),
        }
    }

    fn remap_image_inspect(&self, request: &mut RequestContext) {
        let path = request.path().to_string();
        let Some(image) = self.inspect.captures(&path).and_then(|caps| caps.get(1)) else {
            return;
        };

        if let Some(replacement) = self.remap(image.as_str()) {
            let new_path = format!("{}{}{}", &path[..image.start()], replacement, &path[image.end()..]);
            request.url.set_path(&new_path);
        }
    }
}

impl Unit for RemapImageMutator {
    fn name(&self) -> &'static str {
        "RemapImageMutator"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        if method == Method::POST {
            let path = url.path();
            return path.ends_with("/containers/create") || path.ends_with("/images/create");
        }
        method == Method::GET && self.inspect.is_match(url.path())
    }

    fn describe(&self) -> String {
        format!("RemapImageMutator - rewriting image {} to {}", self.from, self.to)
    }
}

#[async_trait]
impl Mutator for RemapImageMutator {
    async fn run(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        if request.method() == Method::GET {
            self.remap_image_inspect(request);
            return Ok(());
        }

        if request.path().ends_with("/containers/create") {
            self.remap_container_create(request)
        } else {
            self.remap_image_pull(request);
            Ok(())
        }
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Mutator>, MiddlewareError> {
    let settings: RemapImageSettings = config.parse()?;
    let from = require(settings.from, "from")?;
    let to = require(settings.to, "to")?;
    Ok(Arc::new(RemapImageMutator::new(&from, &to)?))
}
