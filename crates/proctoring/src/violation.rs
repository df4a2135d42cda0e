//! Violation kinds, severities, and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classified anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Nobody in front of the camera
    NoFace,

    /// More than one person visible
    MultipleFaces,

    /// Head turned or face off-centre
    LookingAway,

    /// Face fills too much of the frame
    FaceTooClose,

    /// Face too small to verify
    FaceTooFar,

    /// Face region too dark
    PoorLighting,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 6] = [
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::LookingAway,
        ViolationKind::FaceTooClose,
        ViolationKind::FaceTooFar,
        ViolationKind::PoorLighting,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "NO_FACE",
            ViolationKind::MultipleFaces => "MULTIPLE_FACES",
            ViolationKind::LookingAway => "LOOKING_AWAY",
            ViolationKind::FaceTooClose => "FACE_TOO_CLOSE",
            ViolationKind::FaceTooFar => "FACE_TOO_FAR",
            ViolationKind::PoorLighting => "POOR_LIGHTING",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::NoFace
            | ViolationKind::MultipleFaces
            | ViolationKind::FaceTooClose
            | ViolationKind::FaceTooFar => Severity::High,
            ViolationKind::LookingAway | ViolationKind::PoorLighting => Severity::Medium,
        }
    }

    /// Status shown while this violation is current
    ///
    /// Multiple faces is high severity but only a warning: a second person may
    /// be passing behind the candidate.
    pub fn status(&self) -> ProctoringStatus {
        match self {
            ViolationKind::MultipleFaces => ProctoringStatus::Warning,
            kind if kind.severity() == Severity::High => ProctoringStatus::Violation,
            _ => ProctoringStatus::Warning,
        }
    }

    /// Message shown to the candidate
    pub fn message(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected. Please stay in front of the camera.",
            ViolationKind::MultipleFaces => "Multiple faces detected. Only the candidate may be visible.",
            ViolationKind::LookingAway => "Please look at the screen.",
            ViolationKind::FaceTooClose => "You are too close to the camera.",
            ViolationKind::FaceTooFar => "You are too far from the camera.",
            ViolationKind::PoorLighting => "Lighting is too dark. Please improve your lighting.",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// Coarse proctoring status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProctoringStatus {
    #[default]
    Normal,
    Warning,
    Violation,
}

impl ProctoringStatus {
    /// Status for an optional current violation
    pub fn from_violation(kind: Option<ViolationKind>) -> Self {
        kind.map_or(ProctoringStatus::Normal, |k| k.status())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProctoringStatus::Normal => "NORMAL",
            ProctoringStatus::Warning => "WARNING",
            ProctoringStatus::Violation => "VIOLATION",
        }
    }
}

/// A violation appended to the session's audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Faces in the frame that raised it
    pub face_count: usize,
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, face_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: kind.message().to_string(),
            severity: kind.severity(),
            timestamp: Utc::now(),
            face_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(ViolationKind::NoFace.severity(), Severity::High);
        assert_eq!(ViolationKind::MultipleFaces.severity(), Severity::High);
        assert_eq!(ViolationKind::FaceTooClose.severity(), Severity::High);
        assert_eq!(ViolationKind::FaceTooFar.severity(), Severity::High);
        assert_eq!(ViolationKind::LookingAway.severity(), Severity::Medium);
        assert_eq!(ViolationKind::PoorLighting.severity(), Severity::Medium);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ViolationKind::NoFace.status(), ProctoringStatus::Violation);
        assert_eq!(ViolationKind::MultipleFaces.status(), ProctoringStatus::Warning);
        assert_eq!(ViolationKind::FaceTooClose.status(), ProctoringStatus::Violation);
        assert_eq!(ViolationKind::FaceTooFar.status(), ProctoringStatus::Violation);
        assert_eq!(ViolationKind::LookingAway.status(), ProctoringStatus::Warning);
        assert_eq!(ViolationKind::PoorLighting.status(), ProctoringStatus::Warning);
        assert_eq!(ProctoringStatus::from_violation(None), ProctoringStatus::Normal);
    }

    #[test]
    fn test_event_serialization() {
        let event = ViolationEvent::new(ViolationKind::NoFace, 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NO_FACE");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["message"], ViolationKind::NoFace.message());
    }
}
