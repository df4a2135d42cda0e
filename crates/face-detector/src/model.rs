//! Face detection model boundary and the process-wide model cache

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use media_capture::VideoFrame;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::ModelError;

/// One face as reported by the model, in image pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FacePrediction {
    pub top_left: [f32; 2],
    pub bottom_right: [f32; 2],
    /// Detection probability, when the model reports one
    pub probability: Option<f32>,
    /// 6 landmarks: right eye, left eye, nose, mouth, right ear, left ear
    pub landmarks: Option<Vec<[f32; 2]>>,
}

impl FacePrediction {
    pub fn new(top_left: [f32; 2], bottom_right: [f32; 2]) -> Self {
        Self {
            top_left,
            bottom_right,
            probability: None,
            landmarks: None,
        }
    }
}

/// A loaded face detection model
pub trait FaceModel: Send + Sync {
    /// Run inference on one frame
    fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<FacePrediction>, ModelError>;

    /// Free per-session scratch buffers (detector unmount)
    fn release_buffers(&self) {}

    /// Free the underlying compute context (application shutdown)
    fn dispose(&self) {}
}

/// Asynchronous model loader
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Arc<dyn FaceModel>, ModelError>;
}

/// Memoized model factory shared by every detector in the process
///
/// The first successful load is kept until [`ModelCache::dispose`]. Failed loads
/// are not cached so a remounted screen may try again. A disposed cache
/// refuses further loads.
pub struct ModelCache {
    provider: Arc<dyn ModelProvider>,
    slot: Mutex<Option<Arc<dyn FaceModel>>>,
    loads: AtomicUsize,
    disposed: AtomicBool,
}

impl ModelCache {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Return the cached model, loading it on first use
    pub async fn get_or_load(&self) -> Result<Arc<dyn FaceModel>, ModelError> {
        // Held across the load so concurrent callers wait for one load
        let mut slot = self.slot.lock().await;
        if self.disposed.load(Ordering::Acquire) {
            return Err(ModelError::Disposed);
        }
        if let Some(model) = slot.as_ref() {
            debug!("Using cached face model");
            return Ok(Arc::clone(model));
        }

        info!("Loading face detection model ({})", self.provider.name());
        let model = self.provider.load().await.map_err(|e| {
            error!("Failed to load face model: {}", e);
            e
        })?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!("Face detection model loaded");

        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Whether a model is currently cached
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of successful loads since creation
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Drop the cached model and free its compute context
    pub async fn dispose(&self) {
        let mut slot = self.slot.lock().await;
        self.disposed.store(true, Ordering::Release);
        if let Some(model) = slot.take() {
            info!("Disposing face detection model");
            model.dispose();
        }
    }
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("provider", &self.provider.name())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullModel {
        disposed: Arc<AtomicBool>,
    }

    impl FaceModel for NullModel {
        fn estimate_faces(&self, _frame: &VideoFrame) -> Result<Vec<FacePrediction>, ModelError> {
            Ok(vec![])
        }
        fn dispose(&self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail_first: bool,
        disposed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ModelProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load(&self) -> Result<Arc<dyn FaceModel>, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(ModelError::Load("weights missing".into()));
            }
            tokio::task::yield_now().await;
            Ok(Arc::new(NullModel {
                disposed: self.disposed.clone(),
            }))
        }
    }

    fn provider(fail_first: bool) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_first,
            disposed: Arc::new(AtomicBool::new(false)),
        })
    }

    #[tokio::test]
    async fn test_model_loaded_once() {
        let provider = provider(false);
        let cache = Arc::new(ModelCache::new(provider.clone()));

        let (a, b) = tokio::join!(cache.get_or_load(), cache.get_or_load());
        assert!(a.is_ok() && b.is_ok());
        cache.get_or_load().await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(cache.is_loaded().await);
    }

    #[tokio::test]
    async fn test_failed_load_not_cached() {
        let provider = provider(true);
        let cache = ModelCache::new(provider.clone());

        assert_eq!(
            cache.get_or_load().await.err(),
            Some(ModelError::Load("weights missing".into()))
        );
        assert!(!cache.is_loaded().await);
        assert!(cache.get_or_load().await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispose_frees_model() {
        let provider = provider(false);
        let cache = ModelCache::new(provider.clone());
        cache.get_or_load().await.unwrap();

        cache.dispose().await;
        assert!(provider.disposed.load(Ordering::SeqCst));
        assert!(!cache.is_loaded().await);

        // Disposing again is a no-op
        cache.dispose().await;

        assert_eq!(cache.get_or_load().await.err(), Some(ModelError::Disposed));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
