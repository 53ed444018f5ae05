//! `Upgrade: tcp` 요청(attach, exec 등)의 양방향 스트림 중계
//!
//! 터널 요청에는 미들웨어가 적용되지 않습니다.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tracing::{debug, error};

use super::response::{empty, ProxyBody};
use super::{Result, Upstream};

pub const TUNNEL_PROTOCOL: &str = "tcp";

/// 요청의 `Upgrade` 헤더 값
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<String> {
    headers.get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 업스트림이 101로 응답하면 두 연결을 이어 붙입니다.
///
/// 업스트림이 업그레이드를 거절하면 해당 응답을 일반 응답으로 전달하고 클라이언트 연결은 잇지 않습니다.
pub async fn open(upstream: &Upstream, mut req: Request<Incoming>) -> Result<Response<ProxyBody>> {
    let client_upgrade = hyper::upgrade::on(&mut req);

    let (parts, body) = req.into_parts();
    let mut upstream_response = upstream.send(Request::from_parts(parts, body.boxed())).await?;

    if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        debug!(status = %upstream_response.status(), "업스트림이 업그레이드를 거절했습니다");
        return Ok(upstream_response.map(BodyExt::boxed));
    }

    let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
    tokio::spawn(async move {
        let (client, engine) = match tokio::try_join!(client_upgrade, upstream_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "터널 업그레이드 실패");
                return;
            }
        };

        // 핸드셰이크 중 미리 읽힌 바이트는 Upgraded가 먼저 돌려줌
        let mut client = TokioIo::new(client);
        let mut engine = TokioIo::new(engine);
        match tokio::io::copy_bidirectional(&mut client, &mut engine).await {
            Ok((sent, received)) => debug!(sent, received, "터널 종료"),
            Err(e) => error!(error = %e, "터널 중계 오류"),
        }
    });

    let (parts, _) = upstream_response.into_parts();
    Ok(Response::from_parts(parts, empty()))
}
