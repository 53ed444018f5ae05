//! Docker 엔진과의 연동
//!
//! 미들웨어가 엔진 측 리소스(라벨이 붙은 볼륨 등)를 조회할 때 사용하는
//! 메타데이터 저장소와 이미지 레퍼런스 파서를 제공합니다.

mod error_types;
mod metadata;
pub mod reference;
mod retry;

pub use error_types::DockerError;
pub use metadata::{DockerMetadataStore, MetadataStore, StaticMetadataStore};
pub use reference::ImageReference;
pub use retry::{with_retry, RetryPolicy, RetryableOperation};
