//! Detection poll loop
//!
//! Each cycle: wait the poll interval, wait for the next animation frame, run one
//! detection, deliver it, repeat. The next timer is only armed after the previous
//! result was produced, so at most one inference is in flight.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use media_capture::FrameSource;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::detector::{detect_faces, FrameDetection};
use crate::model::FaceModel;
use crate::DetectorError;

/// Source of animation-frame callbacks
#[async_trait]
pub trait FrameClock: Send + Sync {
    /// Resolve at the next rendered frame
    async fn next_frame(&self);
}

/// Animation frames of a page that may be hidden
///
/// While the page is hidden no frames are produced, which pauses detection.
pub struct AnimationFrames {
    period: Duration,
    visible: watch::Receiver<bool>,
}

impl AnimationFrames {
    pub fn new(period: Duration, visible: watch::Receiver<bool>) -> Self {
        Self { period, visible }
    }

    /// Frames for a page that is never hidden
    pub fn always_visible(period: Duration) -> Self {
        let (_tx, rx) = watch::channel(true);
        Self::new(period, rx)
    }
}

#[async_trait]
impl FrameClock for AnimationFrames {
    async fn next_frame(&self) {
        let mut visible = self.visible.clone();
        loop {
            let shown = *visible.borrow_and_update();
            if shown {
                break;
            }
            if visible.changed().await.is_err() {
                // Hidden for good
                future::pending::<()>().await;
            }
        }
        tokio::time::sleep(self.period).await;
    }
}

/// Clears the in-flight flag when the inference finishes, even on panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the running poll task
pub struct DetectionLoop {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    in_flight: Arc<AtomicBool>,
}

impl DetectionLoop {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the loop
    pub fn start(
        &mut self,
        model: Arc<dyn FaceModel>,
        source: Arc<dyn FrameSource>,
        config: DetectorConfig,
        clock: Arc<dyn FrameClock>,
        results: mpsc::Sender<FrameDetection>,
    ) -> Result<(), DetectorError> {
        if self.is_running() {
            return Err(DetectorError::AlreadyRunning);
        }

        let cancel_token = CancellationToken::new();
        let worker = PollWorker {
            model,
            source,
            config,
            clock,
            results,
            in_flight: Arc::clone(&self.in_flight),
            cancel_token: cancel_token.clone(),
        };

        info!(
            "Starting face detection loop ({}ms interval)",
            worker.config.poll_interval_ms
        );
        self.handle = Some(tokio::spawn(worker.run()));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel the pending tick and wait for the task to exit
    pub async fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Face detection loop ended abnormally: {}", e);
            }
            info!("Face detection loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Whether an inference is currently executing
    pub fn is_inferring(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Default for DetectionLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct PollWorker {
    model: Arc<dyn FaceModel>,
    source: Arc<dyn FrameSource>,
    config: DetectorConfig,
    clock: Arc<dyn FrameClock>,
    results: mpsc::Sender<FrameDetection>,
    in_flight: Arc<AtomicBool>,
    cancel_token: CancellationToken,
}

impl PollWorker {
    async fn run(self) {
        let interval = self.config.poll_interval();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = async {
                    tokio::time::sleep(interval).await;
                    self.clock.next_frame().await;
                } => {}
            }

            if self.in_flight.load(Ordering::Acquire) {
                debug!("Previous inference still running, skipping tick");
                continue;
            }

            let detection = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                detection = self.tick() => detection,
            };

            if self.cancel_token.is_cancelled() {
                break;
            }

            metrics::counter!(
                "proctor_detections_total",
                "valid" => if detection.is_valid_frame { "true" } else { "false" }
            )
            .increment(1);

            if self.results.send(detection).await.is_err() {
                debug!("Detection receiver dropped, ending loop");
                break;
            }
        }

        debug!("Face detection loop exited");
    }

    async fn tick(&self) -> FrameDetection {
        self.in_flight.store(true, Ordering::Release);
        let guard = InFlight(Arc::clone(&self.in_flight));
        let model = Arc::clone(&self.model);
        let source = Arc::clone(&self.source);
        let config = self.config.clone();

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            detect_faces(model.as_ref(), source.as_ref(), &config)
        });

        match tokio::time::timeout(self.config.inference_timeout(), task).await {
            Ok(Ok(detection)) => detection,
            Ok(Err(e)) => {
                warn!("Face inference task failed: {}", e);
                metrics::counter!("proctor_inference_failures_total").increment(1);
                self.fallback()
            }
            Err(_) => {
                warn!(
                    "Face inference timeout (> {}ms), treating frame as empty",
                    self.config.inference_timeout_ms
                );
                metrics::counter!("proctor_inference_failures_total").increment(1);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> FrameDetection {
        FrameDetection::invalid(self.source.video_width(), self.source.video_height())
    }
}
