use std::path::PathBuf;

use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, error};

use super::response::ProxyBody;
use super::{Error, Result};

/// 엔진 소켓으로 요청을 보내는 클라이언트
///
/// 요청마다 새 연결을 맺습니다. 업그레이드된 연결도 같은 경로로 만들어집니다.
#[derive(Debug, Clone)]
pub struct Upstream {
    socket: PathBuf,
}

impl Upstream {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self { socket: socket.into() }
    }

    pub async fn send(&self, req: Request<ProxyBody>) -> Result<Response<Incoming>> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| Error::UpstreamConnect {
            socket: self.socket.display().to_string(),
            source: e,
        })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                error!(error = %e, "업스트림 연결 오류");
            }
        });

        debug!(method = %req.method(), uri = %req.uri(), "업스트림 요청 전송");
        Ok(sender.send_request(req).await?)
    }
}
