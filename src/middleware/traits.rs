use async_trait::async_trait;
use serde_json::Value;

use super::{Method, MiddlewareError, RequestContext, Url};

/// 게이트의 판정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allowed,
    /// 사람이 읽을 수 있는 거부 사유
    Denied(String),
}

impl GateOutcome {
    pub fn denied(reason: impl Into<String>) -> Self {
        GateOutcome::Denied(reason.into())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }
}

/// 모든 미들웨어 유닛의 공통 인터페이스
///
/// `applies`는 매 요청마다 모든 유닛에 대해 호출되므로 I/O 없이 빠르게 끝나야 합니다.
pub trait Unit: Send + Sync {
    /// 유닛의 고유 이름을 반환합니다.
    fn name(&self) -> &'static str;

    /// 이 요청에 유닛을 적용할지 판단합니다.
    fn applies(&self, method: &Method, url: &Url) -> bool;

    /// 부트스트랩 로그에 출력할 설정 요약
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

/// 요청을 검증만 하는 유닛 (요청을 수정하지 않음)
#[async_trait]
pub trait Gate: Unit {
    async fn run(&self, request: &RequestContext) -> Result<GateOutcome, MiddlewareError>;
}

/// 업스트림으로 보낼 요청을 재작성하는 유닛
#[async_trait]
pub trait Mutator: Unit {
    async fn run(&self, request: &mut RequestContext) -> Result<(), MiddlewareError>;
}

/// 파싱된 응답 본문을 제자리에서 수정하는 유닛
pub trait ResponseFilter: Unit {
    fn run(&self, url: &Url, body: &mut Value) -> Result<(), MiddlewareError>;
}
