use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::docker::MetadataStore;
use crate::middleware::{Method, MiddlewareError, ResponseFilter, Unit, UnitConfig, Url};

pub const KEY: &str = "labelFilter";

/// 목록 API 경로별 설정: (경로 접미사, 오브젝트 종류, 컬렉션 필드)
const LISTINGS: &[(&str, &str, Option<&str>)] = &[
    ("/containers/json", "containers", None),
    ("/images/json", "images", None),
    ("/networks", "networks", None),
    ("/volumes", "volumes", Some("Volumes")),
];

const LABELS_FIELD: &str = "Labels";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelFilterSettings {
    required_labels: Option<BTreeMap<String, String>>,
    forbidden_labels: Option<BTreeMap<String, String>>,
    objects_to_filter: Option<Vec<String>>,
}

/// 라벨 조건으로 목록 응답의 항목을 걸러냅니다.
///
/// forbidden 조건을 먼저 적용한 뒤 required 조건을 적용합니다.
pub struct LabelFilter {
    required: BTreeMap<String, String>,
    forbidden: BTreeMap<String, String>,
    objects: Vec<String>,
}

impl LabelFilter {
    pub fn new(
        required: BTreeMap<String, String>,
        forbidden: BTreeMap<String, String>,
        objects: Vec<String>,
    ) -> Self {
        Self { required, forbidden, objects }
    }

    fn listing(&self, url: &Url) -> Option<&'static (&'static str, &'static str, Option<&'static str>)> {
        let path = url.path();
        LISTINGS.iter().find(|(suffix, object, _)| {
            path.ends_with(suffix) && self.objects.iter().any(|o| o == object)
        })
    }

    fn keep(&self, item: &Value) -> bool {
        let labels = item.get(LABELS_FIELD).and_then(Value::as_object);
        let has_all = |expected: &BTreeMap<String, String>| {
            expected.iter().all(|(key, value)| {
                labels
                    .and_then(|labels| labels.get(key))
                    .and_then(Value::as_str)
                    == Some(value.as_str())
            })
        };

        if !self.forbidden.is_empty() && has_all(&self.forbidden) {
            return false;
        }
        self.required.is_empty() || has_all(&self.required)
    }
}

impl Unit for LabelFilter {
    fn name(&self) -> &'static str {
        "LabelFilter"
    }

    fn applies(&self, method: &Method, url: &Url) -> bool {
        method == Method::GET && self.listing(url).is_some()
    }

    fn describe(&self) -> String {
        format!(
            "LabelFilter - Forbidden: {:?}; Required: {:?}; Objects: {}",
            self.forbidden,
            self.required,
            self.objects.join(", ")
        )
    }
}

impl ResponseFilter for LabelFilter {
    fn run(&self, url: &Url, body: &mut Value) -> Result<(), MiddlewareError> {
        let Some((_, _, collection)) = self.listing(url) else {
            return Ok(());
        };

        let items = match collection {
            Some(field) => match body.get_mut(*field) {
                Some(items) => items,
                None => return Ok(()),
            },
            None => body,
        };

        match items {
            Value::Null => Ok(()),
            Value::Array(items) => {
                items.retain(|item| self.keep(item));
                Ok(())
            }
            _ => Err(MiddlewareError::InvalidBody("목록 응답이 배열이 아닙니다".to_string())),
        }
    }
}

pub fn construct(config: &UnitConfig, _metadata: &Arc<dyn MetadataStore>) -> Result<Arc<dyn ResponseFilter>, MiddlewareError> {
    let settings: LabelFilterSettings = config.parse()?;
    if settings.required_labels.is_none() && settings.forbidden_labels.is_none() {
        return Err(MiddlewareError::Config(
            "Either 'requiredLabels' or 'forbiddenLabels' needs to be configured".to_string(),
        ));
    }

    let objects = settings.objects_to_filter.unwrap_or_else(|| {
        LISTINGS.iter().map(|(_, object, _)| object.to_string()).collect()
    });

    Ok(Arc::new(LabelFilter::new(
        settings.required_labels.unwrap_or_default(),
        settings.forbidden_labels.unwrap_or_default(),
        objects,
    )))
}
