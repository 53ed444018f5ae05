use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, UnixListener};
use tracing::{error, info, warn};

use crate::settings::ListenAddress;
use super::handler::RequestHandler;
use super::Result;

pub enum ServerListener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl ServerListener {
    pub async fn bind(address: &ListenAddress) -> Result<Self> {
        match address {
            ListenAddress::Unix(path) => {
                // 이전 실행에서 남은 소켓 파일 제거
                if tokio::fs::symlink_metadata(path).await.is_ok() {
                    warn!(path = %path.display(), "기존 소켓 파일 제거");
                    tokio::fs::remove_file(path).await?;
                }

                let listener = UnixListener::bind(path).map_err(|e| {
                    error!(error = %e, path = %path.display(), "유닉스 소켓 바인딩 실패");
                    e
                })?;
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)).await?;

                info!(path = %path.display(), "유닉스 소켓 리스너 시작");
                Ok(ServerListener::Unix { listener, path: path.clone() })
            }
            ListenAddress::Tcp(port) => {
                let listener = TcpListener::bind(("0.0.0.0", *port)).await.map_err(|e| {
                    error!(error = %e, port = port, "TCP 포트 바인딩 실패");
                    e
                })?;

                info!(port = port, "TCP 리스너 시작");
                Ok(ServerListener::Tcp(listener))
            }
        }
    }

    /// `shutdown`이 끝날 때까지 연결을 받습니다. 연결마다 태스크 하나를 띄웁니다.
    pub async fn run<F>(self, handler: Arc<RequestHandler>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("종료 신호 수신, 새 연결 수락 중단");
                    break;
                }
                accepted = self.accept(handler.clone()) => {
                    if let Err(e) = accepted {
                        error!(error = %e, "연결 수락 실패");
                    }
                }
            }
        }

        if let ServerListener::Unix { path, .. } = &self {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(error = %e, path = %path.display(), "소켓 파일 제거 실패");
            }
        }
        Ok(())
    }

    async fn accept(&self, handler: Arc<RequestHandler>) -> std::io::Result<()> {
        match self {
            ServerListener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                tokio::spawn(async move {
                    if let Err(err) = handler.handle_connection(TokioIo::new(stream)).await {
                        error!(error = %err, "연결 처리 실패");
                    }
                });
            }
            ServerListener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                tokio::spawn(async move {
                    if let Err(err) = handler.handle_connection(TokioIo::new(stream)).await {
                        error!(error = %err, client = %addr, "연결 처리 실패");
                    }
                });
            }
        }
        Ok(())
    }
}
