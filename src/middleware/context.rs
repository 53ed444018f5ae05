use percent_encoding::percent_decode_str;
use serde_json::Value;

use super::{Method, MiddlewareError, Url};

const URL_BASE: &str = "http://localhost";

/// 미들웨어 파이프라인을 통과하는 요청 상태
///
/// 메서드는 고정이며, URL(경로와 쿼리)과 JSON 본문만 변경할 수 있습니다.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl RequestContext {
    pub fn new(method: Method, url: Url, body: Option<Value>) -> Self {
        Self { method, url, body }
    }

    /// `/v1.43/containers/create?name=x` 형태의 경로로부터 컨텍스트를 만듭니다.
    pub fn from_path(method: Method, path_and_query: &str, body: Option<Value>) -> Result<Self, url::ParseError> {
        Ok(Self::new(method, parse_request_url(path_and_query)?, body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// 업스트림 요청에 사용할 경로와 쿼리
    pub fn path_and_query(&self) -> String {
        url_path_and_query(&self.url)
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    /// 쿼리 파라미터를 설정합니다. 같은 이름의 기존 값은 모두 대체됩니다.
    pub fn set_query_param(&mut self, key: &str, value: &str) {
        let mut pairs: Vec<(String, String)> = self.url
            .query_pairs()
            .filter(|(name, _)| name != key)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        pairs.push((key.to_string(), value.to_string()));

        self.url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    /// 본문을 수정 가능한 JSON 객체로 반환합니다. 본문이 없거나 객체가 아니면 오류입니다.
    pub fn body_object_mut(&mut self) -> Result<&mut serde_json::Map<String, Value>, MiddlewareError> {
        match self.body.as_mut() {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(MiddlewareError::InvalidBody("JSON 객체가 아닙니다".to_string())),
            None => Err(MiddlewareError::InvalidBody("요청 본문이 없습니다".to_string())),
        }
    }
}

/// 요청 대상(path + query)을 URL로 변환합니다.
pub fn parse_request_url(path_and_query: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}{}", URL_BASE, path_and_query))
}

#[derive(Debug, thiserror::Error)]
pub enum RequestPathError {
    #[error("잘못된 요청 경로: {0}")]
    Parse(#[from] url::ParseError),

    #[error("Ambiguous request path: {0}")]
    Ambiguous(String),
}

/// 엔진의 라우터가 보는 것과 같은 경로로 요청 URL을 만듭니다.
///
/// 경로의 퍼센트 인코딩을 한 번 풀어서(`containers%2Fcreate` -> `containers/create`)
/// 유닛 매칭과 업스트림 전달에 같은 경로를 씁니다. 디코딩 후에도 `%`가 남는 경로는
/// 해석이 갈릴 수 있으므로 거부합니다.
pub fn canonical_request_url(path_and_query: &str) -> Result<Url, RequestPathError> {
    let mut url = parse_request_url(path_and_query)?;

    let decoded = percent_decode_str(url.path())
        .decode_utf8()
        .map_err(|_| RequestPathError::Ambiguous(url.path().to_string()))?
        .into_owned();
    if decoded.contains('%') {
        return Err(RequestPathError::Ambiguous(url.path().to_string()));
    }

    url.set_path(&decoded);
    Ok(url)
}

/// 업스트림 요청 대상(path + query) 문자열
pub fn url_path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// 경로가 주어진 접미사 중 하나로 끝나는지 검사합니다.
pub fn path_ends_with_any(url: &Url, suffixes: &[&str]) -> bool {
    let path = url.path();
    suffixes.iter().any(|suffix| path.ends_with(suffix))
}
