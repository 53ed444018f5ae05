use std::env;

use tracing::Level;

use super::{server::parse_env_var, SettingsError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    Stdout,
    File(String),
}

impl std::str::FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("stdout") {
            Ok(LogOutput::Stdout)
        } else {
            Ok(LogOutput::File(s.to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: Level,
    pub output: LogOutput,
}

impl LogSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            format: parse_env_var("LOG_FORMAT", LogFormat::default)?,
            level: parse_log_level(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))?,
            output: parse_env_var("LOG_OUTPUT", LogOutput::default)?,
        })
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: Level::INFO,
            output: LogOutput::default(),
        }
    }
}

fn parse_log_level(level: String) -> Result<Level, SettingsError> {
    match level.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(SettingsError::EnvVarInvalid {
            var_name: "LOG_LEVEL".to_string(),
            value: level,
            reason: "유효하지 않은 로그 레벨".to_string(),
        }),
    }
}
