//! Proctored session lifecycle
//!
//! `mount()` brings the pipeline up in dependency order: capture, model,
//! detection with its monitor, then lockdown. `unmount()` tears it down in
//! reverse. Dropping a mounted session releases what can be released
//! synchronously.

use std::sync::Arc;

use face_detector::{AnimationFrames, FaceDetector, FrameClock, ModelCache};
use lockdown::{EventTarget, KeyboardLock, LockdownController};
use media_capture::{MediaCapture, MediaDevices, MediaError, MediaSession};
use proctoring::{ProctoringMonitor, ProctoringSnapshot, ViolationSink};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::settings::Settings;

/// Detections buffered between the poll loop and the monitor
const DETECTION_BUFFER: usize = 16;

/// Session error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session already mounted")]
    AlreadyMounted,

    #[error("Camera unavailable: {0}")]
    Capture(MediaError),
}

/// Platform services a session runs against
pub struct SessionDeps {
    pub devices: Arc<dyn MediaDevices>,
    /// Process-wide model cache shared by every session
    pub models: Arc<ModelCache>,
    pub target: Arc<dyn EventTarget>,
    pub keyboard_lock: Arc<dyn KeyboardLock>,
    pub sink: Arc<dyn ViolationSink>,
    /// Called when the candidate leaves fullscreen during the exam
    pub on_fullscreen_exit: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// One proctored exam screen
pub struct ProctoredSession {
    capture: MediaCapture,
    detector: FaceDetector,
    lockdown: LockdownController,
    monitor: Option<ProctoringMonitor>,
    monitor_task: Option<JoinHandle<ProctoringMonitor>>,
    state: watch::Receiver<ProctoringSnapshot>,
    visibility: watch::Sender<bool>,
    mounted: bool,
}

impl ProctoredSession {
    pub fn new(settings: Settings, deps: SessionDeps) -> Self {
        let (visibility, visible) = watch::channel(true);
        let clock: Arc<dyn FrameClock> =
            Arc::new(AnimationFrames::new(settings.detector.frame_period(), visible));
        Self::with_clock(settings, deps, clock, visibility)
    }

    fn with_clock(
        settings: Settings,
        deps: SessionDeps,
        clock: Arc<dyn FrameClock>,
        visibility: watch::Sender<bool>,
    ) -> Self {
        let capture = MediaCapture::new(deps.devices, settings.capture);
        let detector = FaceDetector::with_clock(settings.detector, deps.models, clock);

        let mut lockdown = LockdownController::new(deps.target, deps.keyboard_lock, settings.lockdown);
        if let Some(on_exit) = deps.on_fullscreen_exit {
            lockdown = lockdown.with_fullscreen_exit(move || on_exit());
        }

        let monitor = ProctoringMonitor::new(settings.heuristics, settings.policy, deps.sink);
        let state = monitor.subscribe();

        Self {
            capture,
            detector,
            lockdown,
            monitor: Some(monitor),
            monitor_task: None,
            state,
            visibility,
            mounted: false,
        }
    }

    /// Start capture, detection and lockdown
    ///
    /// Fails only when the camera cannot be acquired, in which case nothing
    /// stays running. A model that fails to load leaves the session mounted
    /// with `detection_error` set on the snapshot.
    pub async fn mount(&mut self) -> Result<(), SessionError> {
        if self.mounted {
            return Err(SessionError::AlreadyMounted);
        }

        if !self.capture.start_capture().await {
            let e = self
                .capture
                .error()
                .cloned()
                .unwrap_or_else(|| MediaError::Other("capture did not start".into()));
            return Err(SessionError::Capture(e));
        }
        self.detector.bind_source(self.capture.video_element());
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.begin_session();
        }

        if self.detector.initialize().await {
            self.start_monitoring();
        } else if let Some(monitor) = &self.monitor {
            let reason = self
                .detector
                .load_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Face detection unavailable".to_string());
            error!("Face detection unavailable for this session: {}", reason);
            monitor.set_detection_error(reason);
        }

        self.lockdown.activate();
        self.mounted = true;
        info!("Proctored session mounted");
        Ok(())
    }

    fn start_monitoring(&mut self) {
        let Some(monitor) = self.monitor.take() else {
            return;
        };
        let (tx, rx) = mpsc::channel(DETECTION_BUFFER);
        match self.detector.start_detection(tx) {
            Ok(()) => self.monitor_task = Some(tokio::spawn(monitor.run(rx))),
            Err(e) => {
                monitor.set_detection_error(e.to_string());
                self.monitor = Some(monitor);
            }
        }
    }

    /// Tear everything down in reverse order; a no-op when not mounted
    pub async fn unmount(&mut self) {
        if !self.mounted {
            return;
        }

        self.lockdown.deactivate();
        // Stopping the loop drops the sender, which ends the monitor task
        self.detector.stop_detection().await;
        if let Some(task) = self.monitor_task.take() {
            match task.await {
                Ok(monitor) => self.monitor = Some(monitor),
                Err(e) => error!("Proctoring monitor task failed: {}", e),
            }
        }
        self.detector.shutdown().await;
        self.capture.stop_capture();

        self.mounted = false;
        info!("Proctored session unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Displayed proctoring state (timer bar badge, video overlay)
    pub fn subscribe(&self) -> watch::Receiver<ProctoringSnapshot> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ProctoringSnapshot {
        self.state.borrow().clone()
    }

    /// Camera/microphone error from the last mount attempt
    pub fn capture_error(&self) -> Option<&MediaError> {
        self.capture.error()
    }

    pub fn media_session(&self) -> &MediaSession {
        self.capture.session()
    }

    pub fn is_detecting(&self) -> bool {
        self.detector.is_detecting()
    }

    pub fn is_locked_down(&self) -> bool {
        self.lockdown.is_active()
    }

    /// Page visibility; detection pauses while hidden
    pub fn set_page_visible(&self, visible: bool) {
        self.visibility.send_replace(visible);
    }
}

impl Drop for ProctoredSession {
    fn drop(&mut self) {
        if self.mounted {
            warn!("Proctored session dropped while mounted");
            self.lockdown.deactivate();
            if let Some(task) = self.monitor_task.take() {
                task.abort();
            }
            // Detection loop and capture stop through their own Drop
            self.capture.stop_capture();
        }
    }
}
