use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MiddlewareError;

/// 정책 설정: 역할별 유닛 설정 목록
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default)]
    pub gates: Vec<UnitConfig>,

    #[serde(default)]
    pub mutators: Vec<UnitConfig>,

    #[serde(default)]
    pub response_filters: Vec<UnitConfig>,
}

/// 단일 유닛 설정. `type` 태그 외의 필드는 유닛별 설정입니다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitConfig {
    #[serde(rename = "type")]
    pub unit_type: String,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl UnitConfig {
    pub fn new(unit_type: impl Into<String>, settings: Value) -> Self {
        let settings = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { unit_type: unit_type.into(), settings }
    }

    /// 유닛별 설정 구조체로 변환합니다.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, MiddlewareError> {
        serde_json::from_value(Value::Object(self.settings.clone())).map_err(|e| {
            MiddlewareError::Config(format!("{} 설정 파싱 실패: {}", self.unit_type, e))
        })
    }
}

/// 필수 설정 값을 꺼냅니다.
pub fn require<T>(value: Option<T>, field: &str) -> Result<T, MiddlewareError> {
    value.ok_or_else(|| MiddlewareError::missing(field))
}

impl PolicyConfig {
    /// YAML 문서를 파싱합니다. 빈 문서나 주석만 있는 문서는 빈 설정입니다.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if is_blank_document(content) {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(content)?;
        Ok(config.unwrap_or_default())
    }

    /// TOML 설정에서 정책을 파싱합니다.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// 다른 설정의 목록을 역할별로 이어 붙입니다.
    pub fn merge(&mut self, other: PolicyConfig) {
        self.gates.extend(other.gates);
        self.mutators.extend(other.mutators);
        self.response_filters.extend(other.response_filters);
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty() && self.mutators.is_empty() && self.response_filters.is_empty()
    }
}

fn is_blank_document(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}
