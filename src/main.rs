use std::sync::Arc;

use docker_socket_proxy::docker::{DockerMetadataStore, MetadataStore};
use docker_socket_proxy::logging::init_logging;
use docker_socket_proxy::middleware::MiddlewareManager;
use docker_socket_proxy::server::ProxyServer;
use docker_socket_proxy::settings::{LogSettings, Settings};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let log_settings = match LogSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("로깅 설정 오류: {}", e);
            std::process::exit(1);
        }
    };

    let _guard = match init_logging(&log_settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("로깅 초기화 실패: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run().await {
        error!(error = %e, "프록시 실행 실패");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().await?;

    let metadata: Arc<dyn MetadataStore> = Arc::new(DockerMetadataStore::connect(
        &settings.server.forwarding_socket,
        settings.server.metadata_timeout,
    )?);

    let middleware_manager = MiddlewareManager::bootstrap(&settings.policy, metadata)?;
    if middleware_manager.is_empty() {
        info!("설정된 미들웨어가 없습니다. 모든 요청을 그대로 전달합니다");
    }

    let server = ProxyServer::bind(&settings.server, middleware_manager).await?;
    server.run().await?;

    info!("프록시 종료");
    Ok(())
}
