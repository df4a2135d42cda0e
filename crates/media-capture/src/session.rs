//! Capture session ownership and teardown

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::devices::{MediaConstraints, MediaDevices};
use crate::frame::VideoElement;
use crate::track::{MediaStream, MediaTrack};
use crate::{CaptureConfig, MediaError};

/// Something that consumes the capture and must stop with it
/// (chunked recording, speech recognition)
pub trait Recorder: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether it is currently running
    fn is_active(&self) -> bool;

    /// Stop and flush. Called at most once per capture teardown.
    fn stop(&mut self);
}

/// An acquired camera + microphone capture
#[derive(Debug, Default)]
pub struct MediaSession {
    video: Option<MediaStream>,
    audio: Option<MediaStream>,
    active: bool,
}

impl MediaSession {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Camera track handle
    pub fn video_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.video.as_ref().and_then(|s| s.video_track())
    }

    /// Microphone track handle
    pub fn audio_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.audio.as_ref().and_then(|s| s.audio_track())
    }

    /// Tracks held by this session that are still live
    pub fn live_track_count(&self) -> usize {
        self.video.iter().chain(self.audio.iter()).map(|s| s.live_count()).sum()
    }

    /// Whether the session still references any stream
    pub fn holds_streams(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }

    /// Stop every track and drop the references
    fn release(&mut self) -> usize {
        let mut stopped = 0;
        for stream in self.video.take().into_iter().chain(self.audio.take()) {
            stopped += stream.tracks().len();
            stream.stop_all();
        }
        self.active = false;
        stopped
    }
}

/// Camera/microphone acquisition for one proctored screen
///
/// Errors are kept in [`MediaCapture::error`] rather than returned. The capture
/// is released on [`MediaCapture::stop_capture`] and on drop.
pub struct MediaCapture {
    devices: Arc<dyn MediaDevices>,
    config: CaptureConfig,
    session: MediaSession,
    element: Arc<VideoElement>,
    recorders: Vec<Box<dyn Recorder>>,
    error: Option<MediaError>,
}

impl MediaCapture {
    /// Create an idle capture
    pub fn new(devices: Arc<dyn MediaDevices>, config: CaptureConfig) -> Self {
        Self {
            devices,
            config,
            session: MediaSession::default(),
            element: Arc::new(VideoElement::new()),
            recorders: Vec::new(),
            error: None,
        }
    }

    /// Request camera and microphone
    ///
    /// Returns `true` when the session is active afterwards. On failure nothing
    /// stays acquired and the reason is available from [`MediaCapture::error`].
    pub async fn start_capture(&mut self) -> bool {
        if self.session.is_active() {
            debug!("Capture already active, ignoring start request");
            return true;
        }
        self.error = None;

        let devices = Arc::clone(&self.devices);
        let video_request = MediaConstraints::Video(self.config.video.clone());
        let video = match devices.get_user_media(&video_request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(e, None),
        };

        if video.video_track().is_none() {
            let e = MediaError::DeviceNotFound("camera stream has no video track".into());
            return self.fail(e, Some(&video));
        }

        let audio = if self.config.require_audio {
            let audio_request = MediaConstraints::Audio(self.config.audio.clone());
            match devices.get_user_media(&audio_request).await {
                Ok(stream) => Some(stream),
                Err(e) => return self.fail(e, Some(&video)),
            }
        } else {
            None
        };

        if let Some(track) = video.video_track() {
            self.element.attach(track);
        }
        self.session = MediaSession {
            video: Some(video),
            audio,
            active: true,
        };

        info!(
            "Media capture started ({} live tracks)",
            self.session.live_track_count()
        );
        true
    }

    fn fail(&mut self, e: MediaError, acquired: Option<&MediaStream>) -> bool {
        if let Some(stream) = acquired {
            // All or nothing: give back what was already granted
            stream.stop_all();
        }
        if e.is_permission() {
            warn!("Media permission denied: {}", e);
        } else {
            error!("Media capture failed: {}", e);
        }
        self.error = Some(e);
        false
    }

    /// Stop recorders and every track; safe to call repeatedly
    pub fn stop_capture(&mut self) {
        for recorder in self.recorders.iter_mut().filter(|r| r.is_active()) {
            info!("Stopping {} with capture", recorder.name());
            recorder.stop();
        }

        self.element.detach();

        if self.session.holds_streams() {
            let stopped = self.session.release();
            info!("Media capture stopped ({} tracks released)", stopped);
        }
    }

    /// Register a consumer that must stop with the capture
    pub fn attach_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorders.push(recorder);
    }

    /// Last acquisition error
    pub fn error(&self) -> Option<&MediaError> {
        self.error.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    /// Video element fed by the camera track
    pub fn video_element(&self) -> Arc<VideoElement> {
        Arc::clone(&self.element)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.stop_capture();
    }
}
