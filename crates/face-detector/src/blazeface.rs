//! BlazeFace (short-range, front camera) output decoding
//!
//! The model sees a 128x128 input and emits, per anchor, 16 regressors
//! (box centre/size + 6 keypoints, in input pixels relative to the anchor) and
//! one logit. Anchors come from two feature maps: 16x16 with 2 anchors per cell
//! and 8x8 with 6 per cell, 896 in total.

use crate::model::FacePrediction;

/// Model input edge length
pub const INPUT_SIZE: usize = 128;

/// Anchors per image
pub const NUM_ANCHORS: usize = 896;

/// Regressor values per anchor
pub const NUM_COORDS: usize = 16;

/// Keypoints per face
pub const NUM_KEYPOINTS: usize = 6;

const SCORE_CLIP: f32 = 100.0;

/// Anchor centre, normalised to the input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
}

/// Generate the SSD anchors for the front model
///
/// Layers with equal stride share one grid, so strides 8,16,16,16 collapse to
/// 2 anchors per 8-px cell and 6 per 16-px cell.
pub fn generate_anchors() -> Vec<Anchor> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in [(8usize, 2usize), (16, 6)] {
        let grid = INPUT_SIZE / stride;
        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    cx: (x as f32 + 0.5) / grid as f32,
                    cy: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

/// One decoded face, coordinates normalised to the input (0-1)
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub score: f32,
    pub keypoints: [[f32; 2]; NUM_KEYPOINTS],
}

impl RawDetection {
    fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0) * (self.ymax - self.ymin).max(0.0)
    }

    fn iou(&self, other: &RawDetection) -> f32 {
        let ix = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let iy = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Scale to image pixels
    pub fn to_prediction(&self, width: u32, height: u32) -> FacePrediction {
        let (w, h) = (width as f32, height as f32);
        FacePrediction {
            top_left: [self.xmin.clamp(0.0, 1.0) * w, self.ymin.clamp(0.0, 1.0) * h],
            bottom_right: [self.xmax.clamp(0.0, 1.0) * w, self.ymax.clamp(0.0, 1.0) * h],
            probability: Some(self.score),
            landmarks: Some(self.keypoints.iter().map(|[x, y]| [x * w, y * h]).collect()),
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-SCORE_CLIP, SCORE_CLIP)).exp())
}

/// Decode raw tensors into scored candidates above `min_score`
///
/// `boxes` is `NUM_ANCHORS * NUM_COORDS` long, `logits` is `NUM_ANCHORS` long.
pub fn decode(boxes: &[f32], logits: &[f32], anchors: &[Anchor], min_score: f32) -> Vec<RawDetection> {
    let scale = INPUT_SIZE as f32;
    let count = anchors
        .len()
        .min(logits.len())
        .min(boxes.len() / NUM_COORDS);

    let mut detections = Vec::new();
    for i in 0..count {
        let score = sigmoid(logits[i]);
        if score < min_score {
            continue;
        }

        let raw = &boxes[i * NUM_COORDS..(i + 1) * NUM_COORDS];
        let anchor = anchors[i];
        let cx = raw[0] / scale + anchor.cx;
        let cy = raw[1] / scale + anchor.cy;
        let w = raw[2] / scale;
        let h = raw[3] / scale;

        let mut keypoints = [[0.0f32; 2]; NUM_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            kp[0] = raw[4 + 2 * k] / scale + anchor.cx;
            kp[1] = raw[5 + 2 * k] / scale + anchor.cy;
        }

        detections.push(RawDetection {
            xmin: cx - w / 2.0,
            ymin: cy - h / 2.0,
            xmax: cx + w / 2.0,
            ymax: cy + h / 2.0,
            score,
            keypoints,
        });
    }
    detections
}

/// Weighted non-maximum suppression
///
/// Overlapping candidates are blended (score-weighted mean of box and
/// keypoints) instead of discarded, which steadies the box between frames.
pub fn weighted_nms(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut output = Vec::new();
    while !candidates.is_empty() {
        let top = candidates[0].clone();
        let (cluster, rest): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| top.iou(c) > iou_threshold);
        candidates = rest;

        // `top` always overlaps itself unless it has zero area
        if cluster.is_empty() {
            candidates.retain(|c| c != &top);
            output.push(top);
            continue;
        }

        let total: f32 = cluster.iter().map(|c| c.score).sum();
        let mut merged = RawDetection {
            xmin: 0.0,
            ymin: 0.0,
            xmax: 0.0,
            ymax: 0.0,
            score: top.score,
            keypoints: [[0.0; 2]; NUM_KEYPOINTS],
        };
        for c in &cluster {
            let w = c.score / total;
            merged.xmin += c.xmin * w;
            merged.ymin += c.ymin * w;
            merged.xmax += c.xmax * w;
            merged.ymax += c.ymax * w;
            for (m, k) in merged.keypoints.iter_mut().zip(c.keypoints.iter()) {
                m[0] += k[0] * w;
                m[1] += k[1] * w;
            }
        }
        output.push(merged);
    }
    output
}

/// Decode, suppress, and scale to image pixels
pub fn postprocess(
    boxes: &[f32],
    logits: &[f32],
    anchors: &[Anchor],
    min_score: f32,
    iou_threshold: f32,
    width: u32,
    height: u32,
) -> Vec<FacePrediction> {
    let candidates = decode(boxes, logits, anchors, min_score);
    weighted_nms(candidates, iou_threshold)
        .iter()
        .map(|d| d.to_prediction(width, height))
        .collect()
}
