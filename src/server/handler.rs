use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use tracing::{debug, error};
use uuid::Uuid;

use crate::logging::{log_request, RequestLog};
use crate::middleware::context::canonical_request_url;
use crate::middleware::MiddlewareManager;
use crate::proxy;
use super::response::{json_error, ProxyBody};
use super::tunnel::{self, upgrade_protocol, TUNNEL_PROTOCOL};
use super::{Error, Result, Upstream};

pub struct RequestHandler {
    middleware_manager: Arc<MiddlewareManager>,
    upstream: Upstream,
    max_body_size: usize,
}

impl RequestHandler {
    pub fn new(middleware_manager: Arc<MiddlewareManager>, upstream: Upstream, max_body_size: usize) -> Self {
        Self {
            middleware_manager,
            upstream,
            max_body_size,
        }
    }

    /// 요청 하나를 처리합니다. 모든 실패는 여기서 JSON 오류 응답으로 바뀝니다.
    pub async fn handle_request(&self, req: Request<Incoming>) -> std::result::Result<Response<ProxyBody>, Infallible> {
        let mut log = RequestLog::new(Uuid::new_v4().to_string());
        log.with_request(&req);

        let response = match self.route(req, &mut log).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    error!(request_id = %log.request_id, error = %e, "요청 처리 실패");
                    log.with_error(&e);
                }
                json_error(status, &e.client_message())
            }
        };

        log.with_response(response.status());
        log.finish();
        log_request(&log);
        Ok(response)
    }

    async fn route(&self, mut req: Request<Incoming>, log: &mut RequestLog) -> Result<Response<ProxyBody>> {
        if let Some(protocol) = upgrade_protocol(req.headers()) {
            if !protocol.eq_ignore_ascii_case(TUNNEL_PROTOCOL) {
                return Err(Error::UnsupportedUpgrade(protocol));
            }
            log.tunnel = true;
            return tunnel::open(&self.upstream, req).await;
        }

        let path_and_query = req.uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = canonical_request_url(path_and_query)?;

        // 유닛이 검사한 경로와 엔진이 받는 경로가 같아야 함
        *req.uri_mut() = super::pipeline::to_uri(&url)?;

        let chain = self.middleware_manager.create_chain(req.method(), &url);
        log.with_units(chain.unit_names());
        if !chain.has_middleware() {
            debug!(path = %url.path(), "적용할 미들웨어 없음, 그대로 전달");
        }

        let (forwarded, url) = super::pipeline::prepare(&chain, url, req, self.max_body_size).await?;
        proxy::forward(&self.upstream, &chain, &url, forwarded, self.max_body_size).await
    }

    pub async fn handle_connection<I>(self: Arc<Self>, io: I) -> std::result::Result<(), hyper::Error>
    where
        I: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
    {
        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let handler = self.clone();
                    async move { handler.handle_request(req).await }
                }),
            )
            .with_upgrades()
            .await
    }
}
