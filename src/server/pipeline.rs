//! 요청 파이프라인: 본문 버퍼링 -> 뮤테이터 -> 게이트 -> 재직렬화

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Request, Uri};
use serde_json::Value;
use tracing::debug;

use crate::middleware::context::url_path_and_query;
use crate::middleware::{GateOutcome, MiddlewareChain, RequestContext, Url};
use super::response::{full, ProxyBody};
use super::{Error, Result};

/// 체인을 적용해 업스트림으로 보낼 요청과 최종 URL을 만듭니다.
///
/// 요청 유닛이 없으면 본문은 읽지 않고 그대로 흘려보냅니다.
pub async fn prepare<B>(
    chain: &MiddlewareChain,
    url: Url,
    req: Request<B>,
    max_body_size: usize,
) -> Result<(Request<ProxyBody>, Url)>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    if !chain.has_request_middleware() {
        return Ok((req.map(BodyExt::boxed), url));
    }

    let (mut parts, body) = req.into_parts();

    let (request_body, stream) = if declares_body(&parts.headers, &body) && is_json(&parts.headers) {
        let bytes = read_body(body, &parts.headers, max_body_size).await?;
        let value = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice::<Value>(&bytes)?)
        };
        (value, None)
    } else {
        // JSON이 아닌 본문(빌드 컨텍스트 등)은 스트리밍
        (None, Some(body.boxed()))
    };
    let was_buffered = stream.is_none();

    let mut context = RequestContext::new(parts.method.clone(), url, request_body);
    if let GateOutcome::Denied(reason) = chain.process_request(&mut context).await? {
        return Err(Error::Denied(reason));
    }

    parts.uri = to_uri(&context.url)?;

    let body = match stream {
        Some(stream) => stream,
        None => {
            let bytes = match &context.body {
                Some(value) => Bytes::from(serde_json::to_vec(value)?),
                None => Bytes::new(),
            };
            set_content_length(&mut parts.headers, bytes.len());
            full(bytes)
        }
    };

    debug!(uri = %parts.uri, buffered = was_buffered, "요청 파이프라인 완료");
    Ok((Request::from_parts(parts, body), context.url))
}

/// URL의 경로와 쿼리로 origin-form 요청 대상을 만듭니다.
pub fn to_uri(url: &Url) -> Result<Uri> {
    url_path_and_query(url)
        .parse::<Uri>()
        .map_err(|e| Error::RewrittenUri(e.to_string()))
}

/// `Content-Length > 0` 또는 chunked 전송이면 본문이 있다고 봅니다.
pub fn declares_body<B: Body>(headers: &HeaderMap, body: &B) -> bool {
    let chunked = headers.get(header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.to_ascii_lowercase().contains("chunked"));

    chunked || content_length(headers).map_or(!body.is_end_stream(), |len| len > 0)
}

pub fn is_json(headers: &HeaderMap) -> bool {
    headers.get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// 길이 헤더를 실제 바이트 수로 맞추고 chunked 전송 헤더를 제거합니다.
pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// 최대 크기까지만 본문을 읽습니다.
pub async fn read_body<B>(body: B, headers: &HeaderMap, max_body_size: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if content_length(headers).map_or(false, |len| len > max_body_size as u64) {
        return Err(Error::PayloadTooLarge(max_body_size));
    }

    match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(Error::PayloadTooLarge(max_body_size)),
        Err(e) => Err(Error::BodyError(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::context::parse_request_url;
    use crate::middleware::mutators::RemapImageMutator;
    use crate::middleware::Mutator;
    use crate::server::response::full;
    use http_body_util::Full;
    use std::sync::Arc;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_is_json_ignores_parameters() {
        assert!(is_json(&headers(&[(header::CONTENT_TYPE, "application/json; charset=utf-8")])));
        assert!(!is_json(&headers(&[(header::CONTENT_TYPE, "application/x-tar")])));
        assert!(!is_json(&HeaderMap::new()));
    }

    #[test]
    fn test_declares_body() {
        let body = Full::new(Bytes::from_static(b"{}"));
        assert!(declares_body(&headers(&[(header::CONTENT_LENGTH, "2")]), &body));
        assert!(!declares_body(&headers(&[(header::CONTENT_LENGTH, "0")]), &body));
        assert!(declares_body(&headers(&[(header::TRANSFER_ENCODING, "chunked")]), &body));
    }

    #[test]
    fn test_set_content_length() {
        let mut map = headers(&[(header::TRANSFER_ENCODING, "chunked"), (header::CONTENT_LENGTH, "10")]);
        set_content_length(&mut map, 42);

        assert!(map.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(map[header::CONTENT_LENGTH], "42");
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from(vec![b'a'; 32]));
        let err = read_body(body, &HeaderMap::new(), 16).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(16)));

        let declared = headers(&[(header::CONTENT_LENGTH, "1000")]);
        let err = read_body(Full::new(Bytes::new()), &declared, 16).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(16)));

        let ok = read_body(Full::new(Bytes::from_static(b"{}")), &HeaderMap::new(), 16).await.unwrap();
        assert_eq!(&ok[..], b"{}");
    }

    #[tokio::test]
    async fn test_prepare_returns_rewritten_url() {
        let remap: Arc<dyn Mutator> = Arc::new(RemapImageMutator::new("nginx", "custom/nginx:1.25").unwrap());
        let chain = MiddlewareChain::new(vec![], vec![remap], vec![]);

        let url = parse_request_url("/v1.43/images/nginx/json").unwrap();
        let req = Request::builder()
            .method("GET")
            .uri("/v1.43/images/nginx/json")
            .body(full(Bytes::new()))
            .unwrap();

        let (forwarded, final_url) = prepare(&chain, url, req, 1024).await.unwrap();

        assert_eq!(final_url.path(), "/v1.43/images/custom/nginx:1.25/json");
        assert_eq!(forwarded.uri().path(), final_url.path());
    }

    #[tokio::test]
    async fn test_prepare_without_units_keeps_url() {
        let url = parse_request_url("/v1.43/containers/json?all=1").unwrap();
        let req = Request::builder()
            .uri("/v1.43/containers/json?all=1")
            .body(full(Bytes::new()))
            .unwrap();

        let (forwarded, final_url) = prepare(&MiddlewareChain::default(), url.clone(), req, 1024).await.unwrap();

        assert_eq!(final_url, url);
        assert_eq!(forwarded.uri(), "/v1.43/containers/json?all=1");
    }
}
