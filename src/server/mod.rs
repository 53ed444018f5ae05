//! 프록시 서버: 리스너, 요청 처리, 업스트림 연결

pub mod error;
pub mod handler;
pub mod listener;
pub mod pipeline;
pub mod response;
pub mod tunnel;
pub mod upstream;

use std::future::Future;
use std::sync::Arc;

use tracing::info;

pub use error::Error;
pub use handler::RequestHandler;
pub use listener::ServerListener;
pub use upstream::Upstream;

use crate::middleware::MiddlewareManager;
use crate::settings::ServerSettings;

pub type Result<T> = std::result::Result<T, Error>;

pub struct ProxyServer {
    listener: ServerListener,
    handler: Arc<RequestHandler>,
}

impl ProxyServer {
    pub async fn bind(settings: &ServerSettings, middleware_manager: MiddlewareManager) -> Result<Self> {
        let listener = ServerListener::bind(&settings.listen).await?;
        let handler = RequestHandler::new(
            Arc::new(middleware_manager),
            Upstream::new(settings.forwarding_socket.clone()),
            settings.max_body_size,
        );

        info!(
            listen = %settings.listen,
            upstream = %settings.forwarding_socket.display(),
            "프록시 서버 준비 완료"
        );
        Ok(Self { listener, handler: Arc::new(handler) })
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.listener.run(self.handler, shutdown).await
    }
}

/// SIGINT 또는 SIGTERM을 기다립니다.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "SIGINT 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
