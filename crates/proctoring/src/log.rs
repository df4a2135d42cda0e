//! Violation sink and the in-memory session log

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::violation::{ViolationEvent, ViolationKind};
use crate::ProctoringError;

/// Receiver of logged violations (audit log, backend reporter)
pub trait ViolationSink: Send + Sync {
    fn record(&self, event: &ViolationEvent);
}

type ThresholdCallback = Box<dyn FnOnce(usize) + Send>;

/// Session violation log with an optional "threshold reached" callback
///
/// The callback fires once, on the record that brings the count to
/// `max_violations` (warn the candidate, auto-submit the attempt).
pub struct ViolationLog {
    events: Mutex<Vec<ViolationEvent>>,
    max_violations: Option<usize>,
    on_threshold: Mutex<Option<ThresholdCallback>>,
}

impl ViolationLog {
    pub fn new(max_violations: Option<usize>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_violations,
            on_threshold: Mutex::new(None),
        }
    }

    /// Set the callback fired when `max_violations` is reached
    pub fn on_threshold(&self, callback: impl FnOnce(usize) + Send + 'static) {
        *lock(&self.on_threshold) = Some(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every logged event, oldest first
    pub fn events(&self) -> Vec<ViolationEvent> {
        lock(&self.events).clone()
    }

    /// Most recent event
    pub fn latest(&self) -> Option<ViolationEvent> {
        lock(&self.events).last().cloned()
    }

    /// Events per kind
    pub fn counts_by_kind(&self) -> HashMap<ViolationKind, usize> {
        let mut counts = HashMap::new();
        for event in lock(&self.events).iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Whether the threshold has been hit
    pub fn threshold_reached(&self) -> bool {
        self.max_violations.map_or(false, |max| self.len() >= max)
    }

    /// Serialize the log for upload with the attempt
    pub fn to_json(&self) -> Result<String, ProctoringError> {
        Ok(serde_json::to_string(&*lock(&self.events))?)
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl ViolationSink for ViolationLog {
    fn record(&self, event: &ViolationEvent) {
        let count = {
            let mut events = lock(&self.events);
            events.push(event.clone());
            events.len()
        };
        info!("Violation logged: {} (total: {})", event.kind, count);

        if self.max_violations.map_or(false, |max| count >= max) {
            let callback = lock(&self.on_threshold).take();
            if let Some(callback) = callback {
                warn!("Violation threshold reached ({} violations)", count);
                callback(count);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking callback must not take the log down with it
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
