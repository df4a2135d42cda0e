//! Violation deduplication

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::violation::ViolationKind;

/// Emission state of one violation kind
#[derive(Debug, Clone)]
pub struct GateState {
    /// Last time this kind was logged
    pub last_fired: Instant,
    /// Number of times logged
    pub fire_count: usize,
}

/// Decides which classifications become log entries
///
/// A violation is logged when it starts (the previous frame showed a different
/// or no violation) or when it has persisted past the cooldown since it was last
/// logged.
#[derive(Debug)]
pub struct ViolationGate {
    cooldown: Duration,
    states: HashMap<ViolationKind, GateState>,
    previous: Option<ViolationKind>,
}

impl ViolationGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: HashMap::new(),
            previous: None,
        }
    }

    /// Offer this frame's displayed violation; returns whether to log it
    pub fn offer(&mut self, current: Option<ViolationKind>, now: Instant) -> bool {
        let previous = std::mem::replace(&mut self.previous, current);
        let Some(kind) = current else {
            return false;
        };

        let started = previous != Some(kind);
        let cooled_down = self
            .states
            .get(&kind)
            .map_or(true, |s| now.saturating_duration_since(s.last_fired) >= self.cooldown);

        // Restarts also wait out the cooldown
        if !cooled_down {
            debug!("{} suppressed: in cooldown period", kind);
            return false;
        }
        if !started && self.cooldown.is_zero() {
            return false;
        }

        let state = self.states.entry(kind).or_insert(GateState {
            last_fired: now,
            fire_count: 0,
        });
        state.last_fired = now;
        state.fire_count += 1;
        true
    }

    /// Times a kind has been let through
    pub fn fire_count(&self, kind: ViolationKind) -> usize {
        self.states.get(&kind).map_or(0, |s| s.fire_count)
    }

    /// Forget everything (new attempt)
    pub fn clear(&mut self) {
        self.states.clear();
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_violation_fires() {
        let mut gate = ViolationGate::new(Duration::from_secs(10));
        let now = Instant::now();

        assert!(!gate.offer(None, now));
        assert!(gate.offer(Some(ViolationKind::NoFace), now));
        assert_eq!(gate.fire_count(ViolationKind::NoFace), 1);
    }

    #[test]
    fn test_persisting_violation_respects_cooldown() {
        let mut gate = ViolationGate::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(gate.offer(Some(ViolationKind::NoFace), t0));
        assert!(!gate.offer(Some(ViolationKind::NoFace), t0 + Duration::from_millis(300)));
        assert!(!gate.offer(Some(ViolationKind::NoFace), t0 + Duration::from_secs(5)));
        assert!(gate.offer(Some(ViolationKind::NoFace), t0 + Duration::from_secs(10)));
        assert_eq!(gate.fire_count(ViolationKind::NoFace), 2);
    }

    #[test]
    fn test_flicker_does_not_spam() {
        let mut gate = ViolationGate::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(gate.offer(Some(ViolationKind::LookingAway), t0));
        assert!(!gate.offer(None, t0 + Duration::from_millis(300)));
        assert!(!gate.offer(Some(ViolationKind::LookingAway), t0 + Duration::from_millis(600)));
        // A different kind is independent
        assert!(gate.offer(Some(ViolationKind::MultipleFaces), t0 + Duration::from_millis(900)));
    }

    #[test]
    fn test_zero_cooldown_is_edge_triggered() {
        let mut gate = ViolationGate::new(Duration::ZERO);
        let t0 = Instant::now();

        assert!(gate.offer(Some(ViolationKind::NoFace), t0));
        assert!(!gate.offer(Some(ViolationKind::NoFace), t0));
        assert!(!gate.offer(None, t0));
        assert!(gate.offer(Some(ViolationKind::NoFace), t0));

        gate.clear();
        assert_eq!(gate.fire_count(ViolationKind::NoFace), 0);
    }
}
