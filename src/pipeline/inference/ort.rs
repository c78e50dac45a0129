use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine,
    palm::{PalmDetector, PalmDetectorConfig, hand_crop},
    preprocess::{LANDMARK_INPUT_SIZE, decode_landmarks},
};
use crate::types::{Frame, HandObservation, PalmRegion, Point};

/// Model files the ONNX engine is built from.
#[derive(Clone, Debug)]
pub struct LandmarkModels {
    pub palm_detector: PathBuf,
    pub handpose_estimator: PathBuf,
}

/// MediaPipe palm detector followed by the hand landmark model, per palm.
pub struct OrtEngine {
    handpose: Session,
    palm_detector: PalmDetector,
    min_confidence: f32,
}

impl OrtEngine {
    pub fn new(models: &LandmarkModels, min_confidence: f32) -> Result<Self> {
        let handpose = load_session(&models.handpose_estimator)?;
        let palm_detector =
            PalmDetector::new(&models.palm_detector, PalmDetectorConfig::default())?;

        Ok(Self {
            handpose,
            palm_detector,
            min_confidence,
        })
    }

    fn landmarks_for_palm(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<HandObservation>> {
        let crop = hand_crop(palm, LANDMARK_INPUT_SIZE, frame.width, frame.height);
        let input = crop.sample(frame)?;
        let outputs = self
            .handpose
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run ORT session")?;
        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let raw = decode_landmarks(&flat)?;

        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let confidence = (presence * palm.score).clamp(0.0, 1.0);
        if confidence < self.min_confidence {
            log::trace!("dropping hand with confidence {confidence:.2}");
            return Ok(None);
        }

        let (w, h) = (frame.width as f32, frame.height as f32);
        let landmarks = raw
            .iter()
            .map(|[x, y, _z]| {
                let (px, py) = crop.project(*x, *y);
                Point::new(px / w, 1.0 - py / h)
            })
            .collect();

        Ok(Some(HandObservation {
            landmarks,
            confidence,
        }))
    }
}

impl HandposeEngine for OrtEngine {
    fn detect_hands(&mut self, image: &Frame, max_hands: usize) -> Result<Vec<HandObservation>> {
        let mut palms = self.palm_detector.detect(image)?;
        palms.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut hands = Vec::with_capacity(max_hands);
        for palm in palms.iter().take(max_hands) {
            if let Some(hand) = self.landmarks_for_palm(image, palm)? {
                hands.push(hand);
            }
        }
        Ok(hands)
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}
