//! Per-frame face detection and the detector handle used by a proctored screen

use std::sync::Arc;

use media_capture::{FrameSource, VideoFrame};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::model::{FaceModel, FacePrediction, ModelCache};
use crate::scheduler::{AnimationFrames, DetectionLoop, FrameClock};
use crate::{DetectorError, ModelError};

/// Face bounding box in image pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// 6 landmarks: right eye, left eye, nose, mouth, right ear, left ear
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Vec<(f32, f32)>>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl From<&FacePrediction> for BoundingBox {
    fn from(p: &FacePrediction) -> Self {
        let [x0, y0] = p.top_left;
        let [x1, y1] = p.bottom_right;
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
            confidence: p.probability.unwrap_or(1.0),
            keypoints: p
                .landmarks
                .as_ref()
                .map(|l| l.iter().map(|[x, y]| (*x, *y)).collect()),
        }
    }
}

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameDetection {
    /// One box per detected face
    pub faces: Vec<BoundingBox>,

    /// False when the video had no decoded frame or inference failed
    pub is_valid_frame: bool,

    /// Decoded video width at poll time
    pub frame_width: u32,

    /// Decoded video height at poll time
    pub frame_height: u32,

    /// Mean luminance (0-255) of the primary face region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,

    /// Frame timestamp (milliseconds)
    pub timestamp_ms: u64,
}

impl FrameDetection {
    /// Zero-face result for a frame that could not be evaluated
    pub fn invalid(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            ..Default::default()
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Largest face, the one the classifier measures
    pub fn primary_face(&self) -> Option<&BoundingBox> {
        self.faces
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }
}

/// Evaluate one frame
///
/// The model is not invoked unless the source has decoded dimensions and is
/// playing. Inference errors degrade to the invalid zero-face result.
pub fn detect_faces(
    model: &dyn FaceModel,
    source: &dyn FrameSource,
    config: &DetectorConfig,
) -> FrameDetection {
    let (width, height) = (source.video_width(), source.video_height());
    if !source.is_ready() {
        debug!("Video not ready ({}x{}, paused={})", width, height, source.is_paused());
        return FrameDetection::invalid(width, height);
    }

    let Some(frame) = source.current_frame() else {
        debug!("Video element returned no frame");
        return FrameDetection::invalid(width, height);
    };

    match model.estimate_faces(&frame) {
        Ok(predictions) => build_detection(&frame, &predictions, config),
        Err(e) => {
            warn!("Face inference failed, treating frame as empty: {}", e);
            metrics::counter!("proctor_inference_failures_total").increment(1);
            FrameDetection::invalid(width, height)
        }
    }
}

fn build_detection(
    frame: &VideoFrame,
    predictions: &[FacePrediction],
    config: &DetectorConfig,
) -> FrameDetection {
    let faces: Vec<BoundingBox> = predictions
        .iter()
        .filter(|p| p.probability.map_or(true, |s| s >= config.min_confidence))
        .map(BoundingBox::from)
        .collect();

    let mut detection = FrameDetection {
        faces,
        is_valid_frame: true,
        frame_width: frame.width,
        frame_height: frame.height,
        brightness: None,
        timestamp_ms: frame.timestamp_ms,
    };

    if config.measure_brightness {
        detection.brightness = detection
            .primary_face()
            .and_then(|f| frame.region_luminance(f.x, f.y, f.width, f.height));
    }
    detection
}

/// Face detector bound to one proctored screen
///
/// Borrows the video element from the media capture; never stops its tracks.
pub struct FaceDetector {
    config: DetectorConfig,
    cache: Arc<ModelCache>,
    clock: Arc<dyn FrameClock>,
    model: Option<Arc<dyn FaceModel>>,
    load_error: Option<ModelError>,
    source: Option<Arc<dyn FrameSource>>,
    detection: DetectionLoop,
}

impl FaceDetector {
    /// Create a detector that polls on animation frames of a visible page
    pub fn new(config: DetectorConfig, cache: Arc<ModelCache>) -> Self {
        let clock = Arc::new(AnimationFrames::always_visible(config.frame_period()));
        Self::with_clock(config, cache, clock)
    }

    pub fn with_clock(config: DetectorConfig, cache: Arc<ModelCache>, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            config,
            cache,
            clock,
            model: None,
            load_error: None,
            source: None,
            detection: DetectionLoop::new(),
        }
    }

    /// Load (or reuse) the model
    ///
    /// A failed load is kept and not retried until [`FaceDetector::shutdown`].
    pub async fn initialize(&mut self) -> bool {
        if self.model.is_some() {
            return true;
        }
        if let Some(e) = &self.load_error {
            debug!("Face model previously failed to load: {}", e);
            return false;
        }

        match self.cache.get_or_load().await {
            Ok(model) => {
                self.model = Some(model);
                true
            }
            Err(e) => {
                self.load_error = Some(e);
                false
            }
        }
    }

    /// Bind the video element to poll
    pub fn bind_source(&mut self, source: Arc<dyn FrameSource>) {
        self.source = Some(source);
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// Persistent model load error, if any
    pub fn load_error(&self) -> Option<&ModelError> {
        self.load_error.as_ref()
    }

    pub fn is_detecting(&self) -> bool {
        self.detection.is_running()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run one detection against the bound source
    pub fn detect_once(&self) -> FrameDetection {
        match (&self.model, &self.source) {
            (Some(model), Some(source)) => detect_faces(model.as_ref(), source.as_ref(), &self.config),
            (_, source) => {
                let (w, h) = source
                    .as_ref()
                    .map(|s| (s.video_width(), s.video_height()))
                    .unwrap_or((0, 0));
                FrameDetection::invalid(w, h)
            }
        }
    }

    /// Start the poll loop, delivering every result to `results`
    pub fn start_detection(&mut self, results: mpsc::Sender<FrameDetection>) -> Result<(), DetectorError> {
        let model = match (&self.model, &self.load_error) {
            (Some(model), _) => Arc::clone(model),
            (None, Some(e)) => return Err(DetectorError::ModelUnavailable(e.clone())),
            (None, None) => return Err(DetectorError::NotInitialized),
        };
        let source = self.source.clone().ok_or(DetectorError::NoVideoSource)?;

        self.detection.start(
            model,
            source,
            self.config.clone(),
            Arc::clone(&self.clock),
            results,
        )
    }

    /// Stop polling; no result is delivered after this returns
    pub async fn stop_detection(&mut self) {
        self.detection.stop().await;
    }

    /// Unmount: stop polling and release the model's per-session buffers
    ///
    /// A load error is forgotten so the next mount tries again.
    pub async fn shutdown(&mut self) {
        self.stop_detection().await;
        self.load_error = None;
        if let Some(model) = self.model.take() {
            model.release_buffers();
            info!("Face detector released");
        }
        self.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        width: u32,
        height: u32,
        paused: bool,
    }

    impl FrameSource for StubSource {
        fn video_width(&self) -> u32 {
            self.width
        }
        fn video_height(&self) -> u32 {
            self.height
        }
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn current_frame(&self) -> Option<VideoFrame> {
            Some(VideoFrame::solid(self.width, self.height, [200, 200, 200]))
        }
    }

    struct ScriptedModel {
        result: Result<Vec<FacePrediction>, ModelError>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn returning(result: Result<Vec<FacePrediction>, ModelError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FaceModel for ScriptedModel {
        fn estimate_faces(&self, _frame: &VideoFrame) -> Result<Vec<FacePrediction>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct FailingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn load(&self) -> Result<Arc<dyn FaceModel>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Load("backend unavailable".into()))
        }
    }

    fn ready_source() -> StubSource {
        StubSource {
            width: 640,
            height: 480,
            paused: false,
        }
    }

    #[test]
    fn test_unloaded_video_skips_inference() {
        let model = ScriptedModel::returning(Ok(vec![FacePrediction::new([0.0, 0.0], [1.0, 1.0])]));
        let source = StubSource {
            width: 0,
            height: 0,
            paused: false,
        };

        let detection = detect_faces(&model, &source, &DetectorConfig::default());
        assert_eq!(detection.face_count(), 0);
        assert!(!detection.is_valid_frame);
        assert!(detection.faces.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_paused_video_skips_inference() {
        let model = ScriptedModel::returning(Ok(vec![]));
        let source = StubSource {
            paused: true,
            ..ready_source()
        };

        let detection = detect_faces(&model, &source, &DetectorConfig::default());
        assert!(!detection.is_valid_frame);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prediction_to_bounding_box() {
        let model = ScriptedModel::returning(Ok(vec![FacePrediction::new([100.0, 100.0], [200.0, 220.0])]));

        let detection = detect_faces(&model, &ready_source(), &DetectorConfig::default());
        assert!(detection.is_valid_frame);
        assert_eq!(detection.face_count(), 1);
        let face = &detection.faces[0];
        assert_eq!((face.x, face.y, face.width, face.height), (100.0, 100.0, 100.0, 120.0));
        assert_eq!(detection.frame_width, 640);
        let brightness = detection.brightness.unwrap();
        assert!((brightness - 200.0).abs() < 0.5);
    }

    #[test]
    fn test_low_confidence_dropped() {
        let mut weak = FacePrediction::new([0.0, 0.0], [10.0, 10.0]);
        weak.probability = Some(0.4);
        let mut strong = FacePrediction::new([20.0, 20.0], [60.0, 60.0]);
        strong.probability = Some(0.97);
        let model = ScriptedModel::returning(Ok(vec![weak, strong]));

        let detection = detect_faces(&model, &ready_source(), &DetectorConfig::default());
        assert_eq!(detection.face_count(), 1);
        assert_eq!(detection.faces[0].confidence, 0.97);
    }

    #[test]
    fn test_inference_error_degrades_to_no_face() {
        let model = ScriptedModel::returning(Err(ModelError::Inference("webgl context lost".into())));

        let detection = detect_faces(&model, &ready_source(), &DetectorConfig::default());
        assert_eq!(detection, FrameDetection::invalid(640, 480));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_primary_face_is_largest() {
        let model = ScriptedModel::returning(Ok(vec![
            FacePrediction::new([0.0, 0.0], [10.0, 10.0]),
            FacePrediction::new([100.0, 100.0], [300.0, 300.0]),
        ]));

        let detection = detect_faces(&model, &ready_source(), &DetectorConfig::default());
        assert_eq!(detection.primary_face().unwrap().x, 100.0);
    }

    #[tokio::test]
    async fn test_load_failure_kept_until_shutdown() {
        let provider = Arc::new(FailingProvider::default());
        let cache = Arc::new(ModelCache::new(provider.clone()));
        let mut detector = FaceDetector::new(DetectorConfig::default(), cache);
        detector.bind_source(Arc::new(ready_source()));

        assert!(!detector.initialize().await);
        assert!(!detector.initialize().await);
        assert!(!detector.is_ready());
        assert_eq!(
            detector.load_error(),
            Some(&ModelError::Load("backend unavailable".into()))
        );

        let (tx, _rx) = mpsc::channel(4);
        assert!(matches!(
            detector.start_detection(tx),
            Err(DetectorError::ModelUnavailable(_))
        ));
        assert!(!detector.detect_once().is_valid_frame);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // The next mount tries again
        detector.shutdown().await;
        assert!(detector.load_error().is_none());
        assert!(!detector.initialize().await);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
