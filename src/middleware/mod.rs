//! 정책 미들웨어
//!
//! 요청마다 적용할 게이트(검증), 뮤테이터(요청 재작성), 응답 필터를 선택하고
//! 정해진 순서로 실행합니다.

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod gates;
pub mod manager;
pub mod mutators;
pub mod registry;
pub mod traits;

pub use chain::MiddlewareChain;
pub use config::{PolicyConfig, UnitConfig};
pub use context::RequestContext;
pub use error::MiddlewareError;
pub use manager::MiddlewareManager;
pub use registry::Registry;
pub use traits::{Gate, GateOutcome, Mutator, ResponseFilter, Unit};

pub use hyper::Method;
pub use url::Url;
