//! Synthetic camera and scripted face model for the simulator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use face_detector::{FaceModel, FacePrediction, ModelError, ModelProvider};
use media_capture::{
    MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack, TrackKind, TrackSettings,
    VideoFrame,
};

pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;

/// One stretch of the scripted exam
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub label: &'static str,
    pub duration: Duration,
    pub faces: usize,
    /// Horizontal shift of the face from the frame centre, in pixels
    pub offset_x: f32,
    /// Face width in pixels
    pub face_size: f32,
    /// Grey level of the whole frame
    pub brightness: u8,
}

impl Scene {
    fn new(label: &'static str, secs: u64) -> Self {
        Self {
            label,
            duration: Duration::from_secs(secs),
            faces: 1,
            offset_x: 0.0,
            face_size: 160.0,
            brightness: 140,
        }
    }
}

/// Scenes played back against wall-clock time
#[derive(Debug)]
pub struct Script {
    scenes: Vec<Scene>,
    started: Instant,
}

impl Script {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self {
            scenes,
            started: Instant::now(),
        }
    }

    /// A short exam that walks through every violation kind
    pub fn demo() -> Self {
        Self::new(vec![
            Scene::new("candidate settles in", 2),
            Scene {
                faces: 0,
                ..Scene::new("candidate leaves the desk", 2)
            },
            Scene::new("candidate returns", 1),
            Scene {
                faces: 2,
                ..Scene::new("second person appears", 2)
            },
            Scene {
                face_size: 420.0,
                ..Scene::new("leans into the camera", 2)
            },
            Scene {
                offset_x: 220.0,
                ..Scene::new("looks off to the side", 2)
            },
            Scene {
                brightness: 20,
                ..Scene::new("lights go out", 2)
            },
            Scene::new("back to work", 2),
        ])
    }

    pub fn total_duration(&self) -> Duration {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Scene playing now; the last one holds once the script runs out
    pub fn current(&self) -> Option<&Scene> {
        self.scene_at(self.started.elapsed())
    }

    pub fn scene_at(&self, elapsed: Duration) -> Option<&Scene> {
        let mut end = Duration::ZERO;
        for scene in &self.scenes {
            end += scene.duration;
            if elapsed < end {
                return Some(scene);
            }
        }
        self.scenes.last()
    }
}

/// Camera track rendering flat frames at the scene's brightness
pub struct SyntheticTrack {
    kind: TrackKind,
    live: AtomicBool,
    script: Arc<Script>,
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> &str {
        match self.kind {
            TrackKind::Video => "synthetic-camera",
            TrackKind::Audio => "synthetic-microphone",
        }
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn settings(&self) -> Option<TrackSettings> {
        (self.kind == TrackKind::Video).then_some(TrackSettings {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            frame_rate: 30.0,
        })
    }

    fn grab_frame(&self) -> Option<VideoFrame> {
        if self.kind != TrackKind::Video || !self.is_live() {
            return None;
        }
        let level = self.script.current().map_or(0, |s| s.brightness);
        Some(VideoFrame::solid(FRAME_WIDTH, FRAME_HEIGHT, [level; 3]))
    }
}

/// Devices that always grant access
pub struct SyntheticDevices {
    script: Arc<Script>,
}

impl SyntheticDevices {
    pub fn new(script: Arc<Script>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError> {
        let kind = match constraints {
            MediaConstraints::Video(_) => TrackKind::Video,
            MediaConstraints::Audio(_) => TrackKind::Audio,
        };
        let track = Arc::new(SyntheticTrack {
            kind,
            live: AtomicBool::new(true),
            script: Arc::clone(&self.script),
        });
        Ok(MediaStream::new(vec![track as Arc<dyn MediaTrack>]))
    }
}

/// Reports the faces the current scene calls for
pub struct ScriptedModel {
    script: Arc<Script>,
}

impl FaceModel for ScriptedModel {
    fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<FacePrediction>, ModelError> {
        let Some(scene) = self.script.current() else {
            return Ok(Vec::new());
        };

        let size = scene.face_size;
        let cx = frame.width as f32 / 2.0 + scene.offset_x;
        let cy = frame.height as f32 / 2.0;
        Ok((0..scene.faces)
            .map(|i| {
                // Extra faces sit side by side
                let x = cx - size / 2.0 + i as f32 * size;
                let mut prediction =
                    FacePrediction::new([x, cy - size / 2.0], [x + size, cy + size / 2.0]);
                prediction.probability = Some(0.97);
                prediction
            })
            .collect())
    }
}

pub struct ScriptedProvider {
    script: Arc<Script>,
}

impl ScriptedProvider {
    pub fn new(script: Arc<Script>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn load(&self) -> Result<Arc<dyn FaceModel>, ModelError> {
        Ok(Arc::new(ScriptedModel {
            script: Arc::clone(&self.script),
        }))
    }
}
