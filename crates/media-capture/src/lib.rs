//! Media Acquisition for Proctored Sessions
//!
//! Owns the camera and microphone capture of a proctored screen:
//! - Independent camera (1280x720 @ 30fps, front-facing) and microphone requests
//! - All-or-nothing activation, idempotent teardown
//! - Video element abstraction the face detector polls frames from

pub mod devices;
pub mod frame;
pub mod session;
pub mod track;

pub use devices::{MediaConstraints, MediaDevices};
pub use frame::{FrameSource, VideoElement, VideoFrame};
pub use session::{MediaCapture, MediaSession, Recorder};
pub use track::{MediaStream, MediaTrack, TrackKind, TrackSettings};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Media acquisition error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Camera or microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No camera or microphone found: {0}")]
    DeviceNotFound(String),

    #[error("Device is already in use by another application: {0}")]
    DeviceBusy(String),

    #[error("Requested constraints cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("Media request aborted: {0}")]
    Aborted(String),

    #[error("Media capture failed: {0}")]
    Other(String),
}

impl MediaError {
    /// Map a platform error name (`NotAllowedError`, `NotFoundError`, ...) to an error
    pub fn from_platform(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                MediaError::PermissionDenied(message)
            }
            "NotFoundError" | "DevicesNotFoundError" => MediaError::DeviceNotFound(message),
            "NotReadableError" | "TrackStartError" => MediaError::DeviceBusy(message),
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                MediaError::Overconstrained(message)
            }
            "AbortError" => MediaError::Aborted(message),
            _ => MediaError::Other(format!("{}: {}", name, message)),
        }
    }

    /// Whether the user can fix this by granting access in the browser/OS
    pub fn is_permission(&self) -> bool {
        matches!(self, MediaError::PermissionDenied(_))
    }
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Front-facing ("user") camera
    #[default]
    User,
    /// Rear-facing ("environment") camera
    Environment,
}

/// Video capture constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Ideal capture width
    pub ideal_width: u32,
    /// Ideal capture height
    pub ideal_height: u32,
    /// Ideal frame rate
    pub ideal_fps: u32,
    /// Preferred camera
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            ideal_fps: 30,
            facing_mode: FacingMode::User,
        }
    }
}

/// Audio capture constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera constraints
    pub video: VideoConstraints,
    /// Microphone constraints
    pub audio: AudioConstraints,
    /// Request the microphone in addition to the camera
    pub require_audio: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video: VideoConstraints::default(),
            audio: AudioConstraints::default(),
            require_audio: true,
        }
    }
}

impl CaptureConfig {
    /// Camera-only capture (mock interview preview, device check)
    pub fn video_only() -> Self {
        Self {
            require_audio: false,
            ..Default::default()
        }
    }
}
