//! Face Detector
//!
//! Polls a live video element on a fixed cadence and runs a BlazeFace-class
//! model against each frame:
//! - Process-wide model cache (load once, dispose on shutdown)
//! - Invalid-frame fallback while the video is not decoded or paused
//! - Self-rescheduling poll loop aligned to animation frames
//! - BlazeFace anchor decoding and weighted NMS

pub mod blazeface;
pub mod config;
pub mod detector;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scheduler;

pub use config::DetectorConfig;
pub use detector::{detect_faces, BoundingBox, FaceDetector, FrameDetection};
pub use model::{FaceModel, FacePrediction, ModelCache, ModelProvider};
pub use scheduler::{AnimationFrames, DetectionLoop, FrameClock};

use thiserror::Error;

/// Model error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model loading failed: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected model output: {0}")]
    Output(String),

    #[error("Model has been disposed")]
    Disposed,
}

/// Detector error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Face detection unavailable: {0}")]
    ModelUnavailable(ModelError),

    #[error("Face detection model not loaded")]
    NotInitialized,

    #[error("No video source bound to the detector")]
    NoVideoSource,

    #[error("Detection loop already running")]
    AlreadyRunning,
}
