//! 업스트림 전달과 응답 중계

use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use serde_json::Value;
use tracing::debug;

use crate::middleware::{MiddlewareChain, Url};
use crate::server::pipeline::{is_json, read_body, set_content_length};
use crate::server::response::{full, ProxyBody};
use crate::server::{Result, Upstream};

/// 요청을 업스트림으로 보내고 응답을 돌려줍니다.
///
/// 응답 필터가 있고 응답이 성공(2xx) JSON일 때만 본문을 버퍼링합니다.
/// 그 외의 응답(로그, 이벤트 스트림 등)은 그대로 스트리밍됩니다.
pub async fn forward(
    upstream: &Upstream,
    chain: &MiddlewareChain,
    url: &Url,
    req: Request<ProxyBody>,
    max_body_size: usize,
) -> Result<Response<ProxyBody>> {
    let response = upstream.send(req).await?;

    let filterable = chain.has_response_filters()
        && response.status().is_success()
        && is_json(response.headers());

    if !filterable {
        return Ok(response.map(BodyExt::boxed));
    }

    filter_response(chain, url, response, max_body_size).await
}

async fn filter_response(
    chain: &MiddlewareChain,
    url: &Url,
    response: Response<Incoming>,
    max_body_size: usize,
) -> Result<Response<ProxyBody>> {
    let (mut parts, body) = response.into_parts();
    let bytes = read_body(body, &parts.headers, max_body_size).await?;

    let mut value: Value = serde_json::from_slice(&bytes)?;
    chain.apply_response_filters(url, &mut value)?;

    let filtered = Bytes::from(serde_json::to_vec(&value)?);
    debug!(before = bytes.len(), after = filtered.len(), "응답 필터 적용");

    set_content_length(&mut parts.headers, filtered.len());
    Ok(Response::from_parts(parts, full(filtered)))
}
