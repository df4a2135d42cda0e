//! Classifier and violation policy configuration

use serde::{Deserialize, Serialize};

/// Geometry and lighting thresholds for a single detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    /// Face area / frame area above which the face is too close
    pub max_face_area_ratio: f32,

    /// Face area / frame area below which the face is too far
    pub min_face_area_ratio: f32,

    /// Horizontal offset of the face centre from the frame centre (fraction of width)
    pub max_horizontal_offset: f32,

    /// Vertical offset of the face centre from the frame centre (fraction of height)
    pub max_vertical_offset: f32,

    /// Nose offset from the eye midpoint, in inter-eye distances
    pub max_yaw_ratio: f32,

    /// Mean face luminance (0-255) below which lighting is poor
    pub min_brightness: f32,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            max_face_area_ratio: 0.40,
            min_face_area_ratio: 0.03,
            max_horizontal_offset: 0.30,
            max_vertical_offset: 0.35,
            max_yaw_ratio: 0.35,
            min_brightness: 40.0,
        }
    }
}

impl Heuristics {
    /// Tighter framing, for high-stakes exams
    pub fn strict() -> Self {
        Self {
            max_face_area_ratio: 0.35,
            min_face_area_ratio: 0.05,
            max_horizontal_offset: 0.20,
            max_vertical_offset: 0.25,
            max_yaw_ratio: 0.25,
            min_brightness: 55.0,
        }
    }

    /// Looser framing, for practice sessions
    pub fn lenient() -> Self {
        Self {
            max_face_area_ratio: 0.55,
            min_face_area_ratio: 0.015,
            max_horizontal_offset: 0.40,
            max_vertical_offset: 0.45,
            max_yaw_ratio: 0.50,
            min_brightness: 25.0,
        }
    }
}

/// When classifications become events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationPolicy {
    /// How long a new classification must persist before it is shown (0 = immediately)
    pub debounce_ms: u64,

    /// Minimum delay before the same violation kind is logged again
    pub cooldown_ms: u64,

    /// Logged violations that trigger the threshold callback
    pub max_violations: Option<usize>,

    /// Also log NO_FACE for unevaluated frames before the first valid one (warm-up)
    pub log_invalid_frames: bool,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 0,
            cooldown_ms: 10_000,
            max_violations: None,
            log_invalid_frames: false,
        }
    }
}
