use crate::docker::DockerError;

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("설정 오류: {0}")]
    Config(String),

    #[error("메타데이터 조회 실패: {0}")]
    Lookup(#[from] DockerError),

    #[error("요청 본문 형식 오류: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MiddlewareError {
    /// 필수 설정 항목 누락
    pub fn missing(field: &str) -> Self {
        MiddlewareError::Config(format!("Missing '{}' in config", field))
    }
}
