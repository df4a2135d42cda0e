//! ONNX Runtime backed BlazeFace model

use std::sync::Arc;

use async_trait::async_trait;
use media_capture::VideoFrame;
use ndarray::Array4;
use ort::{GraphOptimizationLevel, Session};
use tracing::{debug, info};

use crate::blazeface::{self, Anchor, INPUT_SIZE, NUM_COORDS};
use crate::config::DetectorConfig;
use crate::model::{FaceModel, FacePrediction, ModelProvider};
use crate::ModelError;

/// BlazeFace session plus its anchors
pub struct OnnxFaceModel {
    session: Session,
    anchors: Vec<Anchor>,
    min_score: f32,
    iou_threshold: f32,
}

impl OnnxFaceModel {
    /// Load and optimise the model at `path`
    pub fn load(path: &str, config: &DetectorConfig) -> Result<Self, ModelError> {
        info!("Loading face detection model from {}", path);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| ModelError::Load(e.to_string()))?;

        Ok(Self {
            session,
            anchors: blazeface::generate_anchors(),
            min_score: config.min_confidence,
            iou_threshold: config.nms_iou_threshold,
        })
    }

    fn preprocess(frame: &VideoFrame) -> Result<Array4<f32>, ModelError> {
        let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| ModelError::Inference("frame buffer does not match its size".into()))?;
        let size = INPUT_SIZE as u32;
        let resized = image::imageops::resize(&img, size, size, image::imageops::FilterType::Triangle);

        // 1x3x128x128, scaled to -1..1
        let mut input = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 127.5) - 1.0;
            }
        }
        Ok(input)
    }
}

impl FaceModel for OnnxFaceModel {
    fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<FacePrediction>, ModelError> {
        let input = Self::preprocess(frame)?;

        let inputs = ort::inputs![input].map_err(|e| ModelError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let mut tensors = Vec::with_capacity(2);
        for i in 0..2 {
            let view = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Output(e.to_string()))?;
            tensors.push(view.iter().copied().collect::<Vec<f32>>());
        }

        // Regressors are [1, 896, 16], logits [1, 896, 1]; output order varies by export
        let (boxes, logits) = if tensors[0].len() >= tensors[1].len() * NUM_COORDS {
            (&tensors[0], &tensors[1])
        } else {
            (&tensors[1], &tensors[0])
        };
        debug!("BlazeFace outputs: {} regressors, {} logits", boxes.len(), logits.len());

        Ok(blazeface::postprocess(
            boxes,
            logits,
            &self.anchors,
            self.min_score,
            self.iou_threshold,
            frame.width,
            frame.height,
        ))
    }
}

/// Loads [`OnnxFaceModel`] off the async runtime
pub struct OnnxModelProvider {
    path: String,
    config: DetectorConfig,
}

impl OnnxModelProvider {
    pub fn new(path: impl Into<String>, config: DetectorConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

#[async_trait]
impl ModelProvider for OnnxModelProvider {
    fn name(&self) -> &str {
        &self.path
    }

    async fn load(&self) -> Result<Arc<dyn FaceModel>, ModelError> {
        let path = self.path.clone();
        let config = self.config.clone();
        let model = tokio::task::spawn_blocking(move || OnnxFaceModel::load(&path, &config))
            .await
            .map_err(|e| ModelError::Load(e.to_string()))??;
        Ok(Arc::new(model))
    }
}
