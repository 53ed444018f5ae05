use hyper::StatusCode;

use crate::middleware::context::RequestPathError;
use crate::middleware::MiddlewareError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Hyper Error: {0}")]
    HyperError(#[from] hyper::Error),

    #[error("Settings Error: {0}")]
    SettingsError(#[from] SettingsError),

    #[error("Middleware Error: {0}")]
    MiddlewareError(#[from] MiddlewareError),

    #[error("잘못된 요청 경로: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("{0}")]
    InvalidPath(#[from] RequestPathError),

    #[error("재작성된 경로가 올바르지 않습니다: {0}")]
    RewrittenUri(String),

    #[error("JSON 처리 실패: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("업스트림 연결 실패 ({socket}): {source}")]
    UpstreamConnect {
        socket: String,
        source: std::io::Error,
    },

    #[error("본문 읽기 실패: {0}")]
    BodyError(String),

    /// 게이트의 거부 사유
    #[error("{0}")]
    Denied(String),

    #[error("본문이 최대 크기({0} bytes)를 초과했습니다")]
    PayloadTooLarge(usize),

    #[error("지원하지 않는 업그레이드 프로토콜: {0}")]
    UnsupportedUpgrade(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Denied(_) => StatusCode::FORBIDDEN,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UnsupportedUpgrade(_) | Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 클라이언트에 보낼 메시지. 내부 오류의 상세 내용은 로그에만 남깁니다.
    pub fn client_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error".to_string(),
            _ => self.to_string(),
        }
    }
}
