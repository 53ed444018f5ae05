//! 업스트림으로 보낼 요청을 재작성하는 뮤테이터

pub mod add_labels;
pub mod add_to_network;
pub mod mount_path;
pub mod remap_image;

pub use add_labels::AddLabelsMutator;
pub use add_to_network::AddToNetworkMutator;
pub use mount_path::MountPathMutator;
pub use remap_image::RemapImageMutator;
