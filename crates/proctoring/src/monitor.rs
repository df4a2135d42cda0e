//! Detection stream to displayed proctoring state

use std::sync::Arc;
use std::time::{Duration, Instant};

use face_detector::FrameDetection;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::config::{Heuristics, ViolationPolicy};
use crate::gate::ViolationGate;
use crate::log::ViolationSink;
use crate::violation::{ProctoringStatus, ViolationEvent};

/// What the timer bar badge and video overlay render
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProctoringSnapshot {
    pub status: ProctoringStatus,
    pub face_count: usize,
    /// Most recently logged violation
    pub latest_violation: Option<ViolationEvent>,
    pub is_valid_frame: bool,
    /// Set when face detection could not start (model failed to load)
    pub detection_error: Option<String>,
    /// Violations logged this session
    pub violation_count: usize,
}

/// Consumes detections, keeps the shared state, and forwards violations
pub struct ProctoringMonitor {
    classifier: Classifier,
    gate: ViolationGate,
    policy: ViolationPolicy,
    sink: Arc<dyn ViolationSink>,
    state: watch::Sender<ProctoringSnapshot>,
    /// Whether the source has produced an evaluable frame this session
    warmed_up: bool,
}

impl ProctoringMonitor {
    pub fn new(heuristics: Heuristics, policy: ViolationPolicy, sink: Arc<dyn ViolationSink>) -> Self {
        let (state, _) = watch::channel(ProctoringSnapshot::default());
        Self {
            classifier: Classifier::new(heuristics, Duration::from_millis(policy.debounce_ms)),
            gate: ViolationGate::new(Duration::from_millis(policy.cooldown_ms)),
            policy,
            sink,
            state,
            warmed_up: false,
        }
    }

    /// Observe the displayed state (last write wins)
    pub fn subscribe(&self) -> watch::Receiver<ProctoringSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ProctoringSnapshot {
        self.state.borrow().clone()
    }

    /// Apply one detection
    pub fn observe(&mut self, detection: &FrameDetection) -> ProctoringSnapshot {
        self.observe_at(detection, Instant::now())
    }

    pub fn observe_at(&mut self, detection: &FrameDetection, now: Instant) -> ProctoringSnapshot {
        let shown = self.classifier.observe(detection, now);

        // Invalid frames before the first valid one are camera warm-up;
        // afterwards they mean the stream or the model went away.
        self.warmed_up |= detection.is_valid_frame;
        let loggable = self.warmed_up || self.policy.log_invalid_frames;
        let event = if !loggable && shown.violation.is_some() {
            debug!("Video warming up, violation not logged");
            None
        } else if self.gate.offer(shown.violation, now) {
            shown.violation.map(|kind| {
                let event = ViolationEvent::new(kind, detection.face_count());
                metrics::counter!("proctor_violations_total", "kind" => kind.as_str()).increment(1);
                self.sink.record(&event);
                event
            })
        } else {
            None
        };

        self.state.send_modify(|s| {
            s.status = shown.status;
            s.face_count = detection.face_count();
            s.is_valid_frame = detection.is_valid_frame;
            if let Some(event) = event {
                s.latest_violation = Some(event);
                s.violation_count += 1;
            }
        });
        self.snapshot()
    }

    /// Start of a mount: warm-up applies again and any earlier detection
    /// error is cleared
    pub fn begin_session(&mut self) {
        self.warmed_up = false;
        self.state.send_modify(|s| s.detection_error = None);
    }

    /// Record that detection is unavailable for this session
    pub fn set_detection_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.state.send_modify(|s| s.detection_error = Some(error));
    }

    /// Apply detections until the producer goes away
    pub async fn run(mut self, mut detections: mpsc::Receiver<FrameDetection>) -> Self {
        info!("Proctoring monitor started");
        while let Some(detection) = detections.recv().await {
            self.observe(&detection);
        }
        info!(
            "Proctoring monitor stopped ({} violations logged)",
            self.snapshot().violation_count
        );
        self
    }

    /// Back to NORMAL with an empty dedup history (new attempt)
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.gate.clear();
        self.warmed_up = false;
        self.state.send_replace(ProctoringSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ViolationLog;
    use crate::violation::ViolationKind;
    use face_detector::BoundingBox;

    fn detection(faces: usize) -> FrameDetection {
        let face = BoundingBox {
            x: 240.0,
            y: 160.0,
            width: 160.0,
            height: 180.0,
            confidence: 0.99,
            keypoints: None,
        };
        FrameDetection {
            faces: vec![face; faces],
            is_valid_frame: true,
            frame_width: 640,
            frame_height: 480,
            brightness: Some(120.0),
            timestamp_ms: 0,
        }
    }

    fn monitor(policy: ViolationPolicy) -> (ProctoringMonitor, Arc<ViolationLog>) {
        let log = Arc::new(ViolationLog::new(policy.max_violations));
        let monitor = ProctoringMonitor::new(Heuristics::default(), policy, log.clone());
        (monitor, log)
    }

    #[test]
    fn test_status_follows_detections() {
        let (mut monitor, log) = monitor(ViolationPolicy::default());
        let rx = monitor.subscribe();
        assert_eq!(rx.borrow().status, ProctoringStatus::Normal);

        let snap = monitor.observe(&detection(0));
        assert_eq!(snap.status, ProctoringStatus::Violation);
        assert_eq!(snap.latest_violation.as_ref().unwrap().kind, ViolationKind::NoFace);
        assert_eq!(rx.borrow().status, ProctoringStatus::Violation);

        let snap = monitor.observe(&detection(2));
        assert_eq!(snap.status, ProctoringStatus::Warning);
        assert_eq!(snap.face_count, 2);
        assert_eq!(snap.latest_violation.as_ref().unwrap().kind, ViolationKind::MultipleFaces);

        let snap = monitor.observe(&detection(1));
        assert_eq!(snap.status, ProctoringStatus::Normal);
        // Latest violation stays for display
        assert_eq!(snap.latest_violation.unwrap().kind, ViolationKind::MultipleFaces);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_persisting_violation_logged_once() {
        let (mut monitor, log) = monitor(ViolationPolicy::default());
        let t0 = Instant::now();
        for i in 0..10 {
            monitor.observe_at(&detection(0), t0 + Duration::from_millis(300 * i));
        }
        assert_eq!(log.len(), 1);
        assert_eq!(monitor.snapshot().violation_count, 1);
    }

    #[test]
    fn test_warm_up_frames_not_logged_by_default() {
        let (mut monitor, log) = monitor(ViolationPolicy::default());

        let snap = monitor.observe(&FrameDetection::invalid(0, 0));
        assert_eq!(snap.status, ProctoringStatus::Violation);
        assert!(!snap.is_valid_frame);
        assert!(snap.latest_violation.is_none());
        assert!(log.is_empty());

        let (mut monitor, log) = self::monitor(ViolationPolicy {
            log_invalid_frames: true,
            ..Default::default()
        });
        monitor.observe(&FrameDetection::invalid(0, 0));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_stream_lost_after_warm_up_is_logged() {
        let (mut monitor, log) = monitor(ViolationPolicy::default());

        monitor.observe(&FrameDetection::invalid(0, 0));
        monitor.observe(&detection(1));
        assert!(log.is_empty());

        // Camera track ended mid-exam
        let snap = monitor.observe(&FrameDetection::invalid(0, 0));
        assert_eq!(snap.status, ProctoringStatus::Violation);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().kind, ViolationKind::NoFace);
    }

    #[test]
    fn test_begin_session_restores_warm_up() {
        let (mut monitor, log) = monitor(ViolationPolicy::default());
        monitor.set_detection_error("Model loading failed: transient");
        monitor.observe(&detection(1));

        monitor.begin_session();
        assert!(monitor.snapshot().detection_error.is_none());
        monitor.observe(&FrameDetection::invalid(0, 0));
        assert!(log.is_empty());
    }

    #[test]
    fn test_threshold_callback_through_monitor() {
        let (mut monitor, log) = monitor(ViolationPolicy {
            cooldown_ms: 0,
            max_violations: Some(3),
            ..Default::default()
        });
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        log.on_threshold(move |count| {
            let _ = tx.send(count);
        });

        for faces in [0, 1, 2, 1, 0] {
            monitor.observe(&detection(faces));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(rx.try_recv().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_run_consumes_stream() {
        let (monitor, log) = monitor(ViolationPolicy::default());
        let state = monitor.subscribe();
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(monitor.run(rx));
        tx.send(detection(1)).await.unwrap();
        tx.send(detection(0)).await.unwrap();
        drop(tx);

        let monitor = task.await.unwrap();
        assert_eq!(monitor.snapshot().status, ProctoringStatus::Violation);
        assert_eq!(state.borrow().face_count, 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_detection_error_and_reset() {
        let (mut monitor, _log) = monitor(ViolationPolicy::default());
        monitor.set_detection_error("Face detection unavailable");
        assert!(monitor.snapshot().detection_error.is_some());

        monitor.observe(&detection(0));
        monitor.reset();
        assert_eq!(monitor.snapshot(), ProctoringSnapshot::default());
    }
}
