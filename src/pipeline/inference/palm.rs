use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    anchors::palm_anchors,
    preprocess::{Letterbox, PALM_INPUT_SIZE, SquareCrop},
};
use crate::types::{Frame, PalmRegion};

const PALM_KEYPOINTS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: palm_anchors(),
            cfg,
        })
    }

    /// Palm candidates in `frame` pixel space, best first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = Letterbox::fit(frame, PALM_INPUT_SIZE)?;
        let outputs = self
            .session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run palm detector session")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let boxes = boxes
            .as_slice()
            .ok_or_else(|| anyhow!("palm boxes not contiguous"))?;
        let scores = scores
            .as_slice()
            .ok_or_else(|| anyhow!("palm scores not contiguous"))?;

        decode_palms(boxes, scores, &self.anchors, &letterbox, &self.cfg)
    }
}

/// Turns raw anchor regressions into palm regions and suppresses overlaps.
pub fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &Letterbox,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let count = anchors.len().min(scores.len());
    if boxes.len() < count * BOX_FEATURES {
        return Err(anyhow!(
            "palm box tensor too small: got {}, need {}",
            boxes.len(),
            count * BOX_FEATURES
        ));
    }

    let input = PALM_INPUT_SIZE as f32;
    let extent = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let bias = (letterbox.pad_x / letterbox.scale, letterbox.pad_y / letterbox.scale);
    let to_frame = |anchor: [f32; 2], dx: f32, dy: f32| {
        (
            (dx / input + anchor[0]) * extent - bias.0,
            (dy / input + anchor[1]) * extent - bias.1,
        )
    };
    let max_x = letterbox.orig_w.saturating_sub(1) as f32;
    let max_y = letterbox.orig_h.saturating_sub(1) as f32;

    let mut candidates = Vec::new();
    for (i, anchor) in anchors.iter().take(count).enumerate() {
        let score = sigmoid(scores[i]);
        if score < cfg.score_threshold {
            continue;
        }

        let f = &boxes[i * BOX_FEATURES..(i + 1) * BOX_FEATURES];
        let (cx, cy) = to_frame(*anchor, f[0], f[1]);
        let half_w = f[2] * extent / input / 2.0;
        let half_h = f[3] * extent / input / 2.0;
        if half_w <= 0.0 || half_h <= 0.0 {
            continue;
        }

        let bbox = [
            (cx - half_w).clamp(0.0, max_x),
            (cy - half_h).clamp(0.0, max_y),
            (cx + half_w).clamp(0.0, max_x),
            (cy + half_h).clamp(0.0, max_y),
        ];
        let landmarks = f[4..]
            .chunks_exact(2)
            .map(|p| to_frame(*anchor, p[0], p[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    Ok(non_max_suppression(candidates, cfg.nms_threshold, cfg.top_k))
}

fn non_max_suppression(
    mut candidates: Vec<PalmRegion>,
    threshold: f32,
    top_k: usize,
) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= top_k {
            break;
        }
        if kept.iter().all(|k| iou(&k.bbox, &candidate.bbox) < threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Square, rotated window around a palm, large enough to hold the fingers.
pub fn hand_crop(region: &PalmRegion, output_size: u32, orig_w: u32, orig_h: u32) -> SquareCrop {
    let center = if region.landmarks.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let n = region.landmarks.len() as f32;
        let (sx, sy) = region
            .landmarks
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    };

    let box_side = (region.bbox[2] - region.bbox[0])
        .abs()
        .max((region.bbox[3] - region.bbox[1]).abs());
    let span = keypoint_span(&region.landmarks);
    let side = box_side.max(span).max(80.0) * 2.4;

    SquareCrop {
        center,
        side,
        angle: palm_orientation(&region.landmarks),
        size: output_size,
        orig_w,
        orig_h,
    }
}

fn keypoint_span(points: &[(f32, f32)]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let (min_x, max_x, min_y, max_y) = points.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |acc, (x, y)| (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y)),
    );
    (max_x - min_x).max(max_y - min_y)
}

/// Principal axis of the palm keypoints, rotated so fingers point up.
fn palm_orientation(points: &[(f32, f32)]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f32;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 / n, acc.1 + p.1 / n));

    let (mut xx, mut xy, mut yy) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        xx += dx * dx / n;
        xy += dx * dy / n;
        yy += dy * dy / n;
    }

    let half_trace = (xx + yy) * 0.5;
    let det = xx * yy - xy * xy;
    let lambda = (half_trace + (half_trace * half_trace - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if xy.abs() > 1e-6 {
        (lambda - yy, xy)
    } else if xx >= yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letterbox() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        }
    }

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    #[test]
    fn decodes_box_around_anchor() {
        let anchors = [[0.5, 0.5], [0.25, 0.25]];
        let mut boxes = vec![0.0; 2 * BOX_FEATURES];
        boxes[2] = 40.0;
        boxes[3] = 20.0;
        let scores = [logit(0.9), logit(0.1)];

        let palms = decode_palms(
            &boxes,
            &scores,
            &anchors,
            &letterbox(),
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(palms.len(), 1);
        let palm = &palms[0];
        assert!((palm.score - 0.9).abs() < 1e-4);
        assert_eq!(palm.bbox, [76.0, 86.0, 116.0, 106.0]);
        assert_eq!(palm.landmarks.len(), PALM_KEYPOINTS);
        assert_eq!(palm.landmarks[0], (96.0, 96.0));
    }

    #[test]
    fn suppresses_overlapping_palms() {
        let region = |score: f32, x: f32| PalmRegion {
            bbox: [x, 0.0, x + 10.0, 10.0],
            landmarks: Vec::new(),
            score,
        };
        let kept = non_max_suppression(
            vec![region(0.6, 1.0), region(0.9, 0.0), region(0.7, 50.0)],
            0.3,
            32,
        );
        let scores: Vec<f32> = kept.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn short_box_tensor_is_an_error() {
        let err = decode_palms(
            &[0.0; 5],
            &[0.0],
            &[[0.5, 0.5]],
            &letterbox(),
            &PalmDetectorConfig::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn crop_is_centered_on_palm_keypoints() {
        let region = PalmRegion {
            bbox: [0.0, 0.0, 100.0, 100.0],
            landmarks: vec![(40.0, 50.0), (60.0, 50.0)],
            score: 0.9,
        };
        let crop = hand_crop(&region, 224, 640, 480);
        assert_eq!(crop.center, (50.0, 50.0));
        assert_eq!(crop.side, 240.0);
        assert_eq!(crop.size, 224);
    }
}
