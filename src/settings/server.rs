use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::SettingsError;

pub const DEFAULT_LISTEN_SOCKET: &str = "/tmp/docker-socket-proxy.sock";
pub const DEFAULT_FORWARDING_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;

/// 프록시가 클라이언트 연결을 받는 주소
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddress {
    Unix(PathBuf),
    Tcp(u16),
}

impl ListenAddress {
    /// 숫자만 있는 값은 TCP 포트, 그 외에는 유닉스 소켓 경로입니다.
    pub fn parse(value: &str) -> Self {
        match value.parse::<u16>() {
            Ok(port) => ListenAddress::Tcp(port),
            Err(_) => ListenAddress::Unix(PathBuf::from(value)),
        }
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            ListenAddress::Tcp(port) => write!(f, "tcp:0.0.0.0:{}", port),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub listen: ListenAddress,

    /// 업스트림 엔진 소켓
    pub forwarding_socket: PathBuf,

    /// 버퍼링하는 요청/응답 본문의 최대 크기 (bytes)
    pub max_body_size: usize,

    pub metadata_timeout: Duration,
}

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let listen = env::var("LISTEN_SOCKET_PATH")
            .map(|value| ListenAddress::parse(&value))
            .unwrap_or_else(|_| ListenAddress::Unix(PathBuf::from(DEFAULT_LISTEN_SOCKET)));

        let settings = Self {
            listen,
            forwarding_socket: parse_env_var("FORWARDING_SOCKET_PATH", || PathBuf::from(DEFAULT_FORWARDING_SOCKET))?,
            max_body_size: parse_env_var("MAX_BODY_SIZE", || DEFAULT_MAX_BODY_SIZE)?,
            metadata_timeout: Duration::from_secs(
                parse_env_var("METADATA_TIMEOUT", || DEFAULT_METADATA_TIMEOUT_SECS)?,
            ),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_body_size == 0 {
            return Err(SettingsError::EnvVarInvalid {
                var_name: "MAX_BODY_SIZE".to_string(),
                value: "0".to_string(),
                reason: "본문 크기 제한은 0보다 커야 합니다".to_string(),
            });
        }

        if self.listen == ListenAddress::Unix(self.forwarding_socket.clone()) {
            return Err(SettingsError::EnvVarInvalid {
                var_name: "LISTEN_SOCKET_PATH/FORWARDING_SOCKET_PATH".to_string(),
                value: self.forwarding_socket.display().to_string(),
                reason: "수신 소켓과 포워딩 소켓은 달라야 합니다".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: ListenAddress::Unix(PathBuf::from(DEFAULT_LISTEN_SOCKET)),
            forwarding_socket: PathBuf::from(DEFAULT_FORWARDING_SOCKET),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            metadata_timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
        }
    }
}
