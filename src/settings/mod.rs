use tracing::debug;

mod error;
pub mod logging;
pub mod policy;
mod server;

pub use error::SettingsError;
pub use logging::{LogFormat, LogOutput, LogSettings};
pub use policy::PolicySource;
pub use server::{parse_env_var, ListenAddress, ServerSettings};

use crate::middleware::PolicyConfig;

pub type Result<T> = std::result::Result<T, SettingsError>;

/// 시작 시 한 번 만들어져 부트스트랩 루틴에 전달되는 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LogSettings,
    pub policy: PolicyConfig,
}

impl Settings {
    pub async fn load() -> Result<Self> {
        let source = PolicySource::from_env();
        debug!(source = ?source, "정책 설정 소스");

        Ok(Self {
            server: ServerSettings::from_env()?,
            logging: LogSettings::from_env()?,
            policy: source.load().await?,
        })
    }
}
