//! Media tracks and streams

use std::fmt;
use std::sync::Arc;

use crate::frame::VideoFrame;

/// Track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Negotiated settings of a live video track
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
}

/// A live capture track (camera or microphone)
///
/// Implementations wrap the platform handle. `stop()` must be idempotent:
/// stopping an ended track is a no-op.
pub trait MediaTrack: Send + Sync {
    /// Platform track id
    fn id(&self) -> &str;

    /// Video or audio
    fn kind(&self) -> TrackKind;

    /// Stop the track and release the device
    fn stop(&self);

    /// Whether the track is still delivering media
    fn is_live(&self) -> bool;

    /// Negotiated settings (video tracks only)
    fn settings(&self) -> Option<TrackSettings> {
        None
    }

    /// Latest decoded frame (video tracks only)
    fn grab_frame(&self) -> Option<VideoFrame> {
        None
    }
}

/// A set of tracks returned by one device request
#[derive(Clone, Default)]
pub struct MediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// First video track, if any
    pub fn video_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
    }

    /// First audio track, if any
    pub fn audio_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)
            .cloned()
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Number of tracks still live
    pub fn live_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tracks.iter().map(|t| (t.id().to_string(), t.kind(), t.is_live())))
            .finish()
    }
}
