//! Device access boundary (camera/microphone permission API)

use async_trait::async_trait;

use crate::track::MediaStream;
use crate::{AudioConstraints, MediaError, VideoConstraints};

/// A single device request: exactly one of video or audio
#[derive(Debug, Clone, PartialEq)]
pub enum MediaConstraints {
    Video(VideoConstraints),
    Audio(AudioConstraints),
}

/// Platform device access
///
/// Resolves once the user grants (or denies) access. Denials come back as
/// `MediaError::PermissionDenied`, missing hardware as `MediaError::DeviceNotFound`.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError>;
}
