//! Video frames and the video element the detector polls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::track::{MediaTrack, TrackKind};

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (milliseconds)
    pub timestamp_ms: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0)
    }

    /// Whether the buffer holds a full RGB image of the stated size
    pub fn is_complete(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() >= (self.width * self.height * 3) as usize
    }

    /// Mean luminance (0-255) of a rectangular region, clipped to the frame
    ///
    /// Returns `None` when the clipped region is empty.
    pub fn region_luminance(&self, x: f32, y: f32, w: f32, h: f32) -> Option<f32> {
        let x0 = x.max(0.0).floor() as u32;
        let y0 = y.max(0.0).floor() as u32;
        let x1 = ((x + w).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 || !self.is_complete() {
            return None;
        }

        let mut sum = 0.0f64;
        for row in y0..y1 {
            let start = ((row * self.width + x0) * 3) as usize;
            let end = ((row * self.width + x1) * 3) as usize;
            sum += self.data[start..end]
                .chunks_exact(3)
                .map(|p| luma(p) as f64)
                .sum::<f64>();
        }
        let count = ((x1 - x0) * (y1 - y0)) as f64;
        Some((sum / count) as f32)
    }
}

// BT.601: 0.299*R + 0.587*G + 0.114*B
fn luma(p: &[u8]) -> f32 {
    p[0] as f32 * 0.299 + p[1] as f32 * 0.587 + p[2] as f32 * 0.114
}

/// Something the detector can poll frames from
///
/// Mirrors a `<video>` element: decoded dimensions are zero until the first
/// frame arrives and drop back to zero when the stream ends.
pub trait FrameSource: Send + Sync {
    /// Decoded width (0 when nothing is decoded yet)
    fn video_width(&self) -> u32;

    /// Decoded height (0 when nothing is decoded yet)
    fn video_height(&self) -> u32;

    /// Whether playback is paused
    fn is_paused(&self) -> bool;

    /// Current frame, if one is available
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Whether the source can be sampled right now
    fn is_ready(&self) -> bool {
        self.video_width() > 0 && self.video_height() > 0 && !self.is_paused()
    }
}

/// Video element fed by a capture track
///
/// The element only borrows the track: stopping the capture ends the track and
/// the element reports zero dimensions from then on.
pub struct VideoElement {
    track: Mutex<Option<Arc<dyn MediaTrack>>>,
    paused: AtomicBool,
}

impl VideoElement {
    /// Create a detached, paused element
    pub fn new() -> Self {
        Self {
            track: Mutex::new(None),
            paused: AtomicBool::new(true),
        }
    }

    /// Bind a video track and start playback
    pub fn attach(&self, track: Arc<dyn MediaTrack>) {
        if track.kind() != TrackKind::Video {
            debug!("Ignoring non-video track {} for video element", track.id());
            return;
        }
        debug!("Video element attached to track {}", track.id());
        if let Ok(mut slot) = self.track.lock() {
            *slot = Some(track);
        }
        self.paused.store(false, Ordering::Release);
    }

    /// Drop the track reference
    pub fn detach(&self) {
        if let Ok(mut slot) = self.track.lock() {
            if slot.take().is_some() {
                debug!("Video element detached");
            }
        }
        self.paused.store(true, Ordering::Release);
    }

    pub fn play(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Whether a track is bound
    pub fn is_attached(&self) -> bool {
        self.track.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    fn live_track(&self) -> Option<Arc<dyn MediaTrack>> {
        let slot = self.track.lock().ok()?;
        slot.as_ref().filter(|t| t.is_live()).cloned()
    }
}

impl Default for VideoElement {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for VideoElement {
    fn video_width(&self) -> u32 {
        self.live_track()
            .and_then(|t| t.settings())
            .map(|s| s.width)
            .unwrap_or(0)
    }

    fn video_height(&self) -> u32 {
        self.live_track()
            .and_then(|t| t.settings())
            .map(|s| s.height)
            .unwrap_or(0)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.live_track()?.grab_frame()
    }
}
