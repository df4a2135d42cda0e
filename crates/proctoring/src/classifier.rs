//! Per-frame classification and the displayed-status state machine

use std::time::{Duration, Instant};

use face_detector::{BoundingBox, FrameDetection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Heuristics;
use crate::violation::{ProctoringStatus, ViolationKind};

// Keypoint order from the detector: right eye, left eye, nose, ...
const RIGHT_EYE: usize = 0;
const LEFT_EYE: usize = 1;
const NOSE: usize = 2;

/// Outcome for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub status: ProctoringStatus,
    pub violation: Option<ViolationKind>,
}

impl Classification {
    pub fn normal() -> Self {
        Self::default()
    }

    pub fn of(kind: ViolationKind) -> Self {
        Self {
            status: kind.status(),
            violation: Some(kind),
        }
    }
}

/// Classify one detection; first matching rule wins
///
/// 1. no face: VIOLATION / NO_FACE
/// 2. several faces: WARNING / MULTIPLE_FACES
/// 3. one face out of bounds: too close, too far, looking away, poor lighting
/// 4. otherwise NORMAL
pub fn classify(detection: &FrameDetection, heuristics: &Heuristics) -> Classification {
    match detection.faces.as_slice() {
        [] => Classification::of(ViolationKind::NoFace),
        [face] => single_face_anomaly(face, detection, heuristics)
            .map(Classification::of)
            .unwrap_or_else(Classification::normal),
        _ => Classification::of(ViolationKind::MultipleFaces),
    }
}

fn single_face_anomaly(
    face: &BoundingBox,
    detection: &FrameDetection,
    h: &Heuristics,
) -> Option<ViolationKind> {
    let frame_w = detection.frame_width as f32;
    let frame_h = detection.frame_height as f32;
    if frame_w <= 0.0 || frame_h <= 0.0 {
        return None;
    }

    let area_ratio = face.area() / (frame_w * frame_h);
    if area_ratio > h.max_face_area_ratio {
        return Some(ViolationKind::FaceTooClose);
    }
    if area_ratio < h.min_face_area_ratio {
        return Some(ViolationKind::FaceTooFar);
    }

    if is_looking_away(face, frame_w, frame_h, h) {
        return Some(ViolationKind::LookingAway);
    }

    match detection.brightness {
        Some(b) if b < h.min_brightness => Some(ViolationKind::PoorLighting),
        _ => None,
    }
}

fn is_looking_away(face: &BoundingBox, frame_w: f32, frame_h: f32, h: &Heuristics) -> bool {
    let (cx, cy) = face.center();
    let dx = (cx / frame_w - 0.5).abs();
    let dy = (cy / frame_h - 0.5).abs();
    if dx > h.max_horizontal_offset || dy > h.max_vertical_offset {
        return true;
    }

    // Head yaw proxy: nose drifts toward one eye as the head turns
    let Some(kp) = face.keypoints.as_deref() else {
        return false;
    };
    if kp.len() <= NOSE {
        return false;
    }
    let (rx, _) = kp[RIGHT_EYE];
    let (lx, _) = kp[LEFT_EYE];
    let (nx, _) = kp[NOSE];
    let eye_span = (lx - rx).abs();
    if eye_span < f32::EPSILON {
        return false;
    }
    let eye_mid = (lx + rx) / 2.0;
    (nx - eye_mid).abs() / eye_span > h.max_yaw_ratio
}

/// Displayed status with optional debounce
///
/// Memoryless when `debounce` is zero: each frame's classification is shown
/// immediately. Otherwise a new classification is shown only after it has been
/// observed continuously for `debounce`.
#[derive(Debug, Clone)]
pub struct Classifier {
    heuristics: Heuristics,
    debounce: Duration,
    current: Classification,
    pending: Option<(Classification, Instant)>,
}

impl Classifier {
    pub fn new(heuristics: Heuristics, debounce: Duration) -> Self {
        Self {
            heuristics,
            debounce,
            current: Classification::normal(),
            pending: None,
        }
    }

    /// Feed one detection, returning the classification now displayed
    pub fn observe(&mut self, detection: &FrameDetection, now: Instant) -> Classification {
        let instant = classify(detection, &self.heuristics);

        if instant == self.current {
            self.pending = None;
            return self.current;
        }

        if self.debounce.is_zero() {
            self.transition(instant);
            return self.current;
        }

        match self.pending {
            Some((candidate, since)) if candidate == instant => {
                if now.saturating_duration_since(since) >= self.debounce {
                    self.transition(instant);
                }
            }
            _ => self.pending = Some((instant, now)),
        }
        self.current
    }

    fn transition(&mut self, next: Classification) {
        debug!(
            "Proctoring status {} -> {}",
            self.current.status.as_str(),
            next.status.as_str()
        );
        self.current = next;
        self.pending = None;
    }

    pub fn current(&self) -> Classification {
        self.current
    }

    pub fn status(&self) -> ProctoringStatus {
        self.current.status
    }

    pub fn heuristics(&self) -> &Heuristics {
        &self.heuristics
    }

    /// Back to NORMAL (new attempt, candidate change)
    pub fn reset(&mut self) {
        self.current = Classification::normal();
        self.pending = None;
    }
}
