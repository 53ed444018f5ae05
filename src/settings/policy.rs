//! 정책(유닛 목록) 설정 로더
//!
//! 우선순위: `CONFIG_FILE` > `CONFIG_DATA` > `CONFIG_DIR`

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Result, SettingsError};
use crate::middleware::PolicyConfig;

pub const DEFAULT_CONFIG_DIR: &str = "/etc/docker-socket-proxy/config.d";

/// 정책을 읽어올 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    File(PathBuf),
    Inline(String),
    Directory(PathBuf),
}

impl PolicySource {
    pub fn from_env() -> Self {
        if let Some(path) = non_empty_var("CONFIG_FILE") {
            PolicySource::File(PathBuf::from(path))
        } else if let Some(data) = non_empty_var("CONFIG_DATA") {
            PolicySource::Inline(data)
        } else {
            let dir = non_empty_var("CONFIG_DIR").unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());
            PolicySource::Directory(PathBuf::from(dir))
        }
    }

    pub async fn load(&self) -> Result<PolicyConfig> {
        match self {
            PolicySource::File(path) => load_file(path).await,
            PolicySource::Inline(data) => parse_yaml(data, "CONFIG_DATA"),
            PolicySource::Directory(dir) => load_directory(dir).await,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_yaml(content: &str, source: &str) -> Result<PolicyConfig> {
    PolicyConfig::from_yaml(content).map_err(|e| SettingsError::PolicyParseError {
        source: source.to_string(),
        reason: e.to_string(),
    })
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| SettingsError::FileError {
        path: path.to_string_lossy().to_string(),
        error: e,
    })
}

/// 확장자로 형식을 고릅니다. `.toml`과 `.json` 외에는 YAML입니다.
pub async fn load_file(path: &Path) -> Result<PolicyConfig> {
    if !path.is_file() {
        return Err(SettingsError::NoConfiguration);
    }

    let content = read(path).await?;
    let source = path.display().to_string();
    let parse_error = |reason: String| SettingsError::PolicyParseError { source: source.clone(), reason };

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => PolicyConfig::from_toml(&content).map_err(|e| parse_error(e.to_string()))?,
        Some("json") => PolicyConfig::from_json(&content).map_err(|e| parse_error(e.to_string()))?,
        _ => PolicyConfig::from_yaml(&content).map_err(|e| parse_error(e.to_string()))?,
    };

    info!(path = %path.display(), "정책 설정 파일 로드 완료");
    Ok(config)
}

/// 디렉토리의 `*.yaml`/`*.yml` 파일을 이름 순으로 읽어 목록을 이어 붙입니다.
pub async fn load_directory(dir: &Path) -> Result<PolicyConfig> {
    if !dir.is_dir() {
        return Err(SettingsError::NoConfiguration);
    }

    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(|e| SettingsError::FileError {
        path: dir.to_string_lossy().to_string(),
        error: e,
    })?;

    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| SettingsError::FileError {
        path: dir.to_string_lossy().to_string(),
        error: e,
    })? {
        let path = entry.path();
        let is_yaml = path.extension().map_or(false, |ext| ext == "yaml" || ext == "yml");
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();

    let mut config = PolicyConfig::default();
    for path in &files {
        debug!(path = %path.display(), "정책 설정 파일 병합");
        let content = read(path).await?;
        config.merge(parse_yaml(&content, &path.display().to_string())?);
    }

    info!(dir = %dir.display(), files = files.len(), "정책 설정 디렉토리 로드 완료");
    Ok(config)
}
