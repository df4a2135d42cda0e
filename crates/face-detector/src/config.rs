//! Face detector configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Face detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum delay between two detections (milliseconds)
    pub poll_interval_ms: u64,

    /// Animation frame period the poll waits for after the timer (milliseconds)
    pub frame_period_ms: u64,

    /// Upper bound on a single inference before the tick degrades to no-face
    pub inference_timeout_ms: u64,

    /// Drop predictions below this probability
    pub min_confidence: f32,

    /// IoU above which overlapping candidates are merged
    pub nms_iou_threshold: f32,

    /// Measure face-region brightness for the lighting check
    pub measure_brightness: bool,

    /// Model path (ONNX builds)
    pub model_path: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            frame_period_ms: 16,
            inference_timeout_ms: 1000,
            min_confidence: 0.75,
            nms_iou_threshold: 0.3,
            measure_brightness: true,
            model_path: None,
        }
    }
}

impl DetectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}
