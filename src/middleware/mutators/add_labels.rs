use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::docker::MetadataStore;
use crate::middleware::config::require;
use crate::middleware::context::path_ends_with_any;
use crate::middleware::{Method, MiddlewareError, Mutator, RequestContext, Unit, UnitConfig, Url};

pub const KEY: &str = "addLabels";

const BODY_LABEL_PATHS: &[&str] = &["/containers/create", "/networks/create", "/volumes/create"];
const BUILD_PATH: &str = "/images/build";

#[derive(Debug, Deserialize)]
struct AddLabelsSettings {
    labels: Option<BTreeMap<String, String>>,
}

/// 생성되는 리소스에 고정 라벨을 추가합니다. 설정 값이 요청 값보다 우선합니다.
pub struct AddLabelsMutator {
    labels: BTreeMap<String, String>,
}

impl AddLabelsMutator {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    fn merge_into(&self, target: &mut Map<String, Value>) {
        for (key, value) in &self.labels {
            target.insert(key.clone(), Value::String(value.clone()));
        }
    }

    /// 빌드 요청은 `labels` 쿼리 파라미터(JSON 객체 문자열)에 라벨을 담습니다.
    fn label_build(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        let mut labels = match request.query_param("labels").filter(|raw| !raw.is_empty()) {
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(MiddlewareError::InvalidBody("labels 쿼리 파라미터는 JSON 객체여야 합니다".to_string())),
            },
            None => Map::new(),
        };

        self.merge_into(&mut labels);
        let encoded = serde_json::to_string(&Value::Object(labels))?;
        request.set_query_param("labels", &encoded);
        Ok(())
    }

    fn label_body(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        let body = request.body_object_mut()?;
        let labels = body.entry("Labels").or_insert_with(|| Value::Object(Map::new()));
        if labels.is_null() {
            *labels = Value::Object(Map::new());
        }

        match labels {
            Value::Object(map) => {
                self.merge_into(map);
                Ok(())
            }
            _ => Err(MiddlewareError::InvalidBody("Labels는 객체여야 합니다".to_string())),
        }
    }
}

impl Unit for AddLabelsMutator {
    fn name(&self) -> &'static str {
        "AddLabelsMutator"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::POST
            && (path_ends_with_any(url, BODY_LABEL_PATHS) || url.path().ends_with(BUILD_PATH))
    }

    fn describe(&self) -> String {
        let labels: Vec<String> = self.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("AddLabelsMutator - adding labels: {}", labels.join(", "))
    }
}

#[async_trait]
impl Mutator for AddLabelsMutator {
    async fn run(&self, request: &mut RequestContext) -> Result<(), MiddlewareError> {
        if request.path().ends_with(BUILD_PATH) {
            self.label_build(request)
        } else {
            self.label_body(request)
        }
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn Mutator>, MiddlewareError> {
    let settings: AddLabelsSettings = config.parse()?;
    Ok(Arc::new(AddLabelsMutator::new(require(settings.labels, "labels")?)))
}
