//! 요청을 검증하는 게이트
//!
//! 게이트는 요청을 수정하지 않으며, 정책 위반 시 `GateOutcome::Denied`를 반환합니다.

pub mod image_loading;
pub mod mount_source;
pub mod namespace_allowlist;
pub mod readonly_access;
pub mod registry;

pub use image_loading::ImageLoadingGate;
pub use mount_source::MountSourceGate;
pub use namespace_allowlist::NamespaceAllowListGate;
pub use readonly_access::ReadonlyAccessGate;
pub use registry::RegistryGate;

use crate::docker::ImageReference;
use super::Url;

/// 이미지 pull 요청에서 대상 이미지를 꺼냅니다. 실패하면 거부 사유를 반환합니다.
pub(crate) fn requested_pull_image(url: &Url) -> Result<ImageReference, String> {
    match ImageReference::from_pull_params(url) {
        Some(Ok(reference)) => Ok(reference),
        Some(Err(e)) => Err(format!("Invalid image reference: {}", e)),
        None => Err("Unable to determine the requested image".to_string()),
    }
}
