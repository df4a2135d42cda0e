//! Proctoring Violation Classifier
//!
//! Turns per-frame face detections into what the exam UI shows:
//! - Precedence classification (no face > multiple faces > position/lighting)
//! - Optional debounce before the displayed status changes
//! - Edge-triggered violation events with per-kind cooldown
//! - Violation log with a one-shot threshold callback

pub mod classifier;
pub mod config;
pub mod gate;
pub mod log;
pub mod monitor;
pub mod violation;

pub use classifier::{classify, Classification, Classifier};
pub use config::{Heuristics, ViolationPolicy};
pub use gate::ViolationGate;
pub use log::{ViolationLog, ViolationSink};
pub use monitor::{ProctoringMonitor, ProctoringSnapshot};
pub use violation::{ProctoringStatus, Severity, ViolationEvent, ViolationKind};

use thiserror::Error;

/// Proctoring error types
#[derive(Error, Debug)]
pub enum ProctoringError {
    #[error("Violation log export failed: {0}")]
    Export(#[from] serde_json::Error),
}
