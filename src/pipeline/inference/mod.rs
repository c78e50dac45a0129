mod anchors;
mod ort;
mod palm;
pub mod preprocess;

use anyhow::Result;

pub use self::ort::{LandmarkModels, OrtEngine};
pub use palm::PalmDetectorConfig;

use crate::types::{Frame, HandObservation, Point};

/// Hand landmark detection service.
pub trait HandposeEngine: Send + 'static {
    /// Landmarks are normalized to `image` with a lower-left origin.
    fn detect_hands(&mut self, image: &Frame, max_hands: usize) -> Result<Vec<HandObservation>>;
}

/// Runs the engine on one sampled frame and flattens every hand into a single
/// point list in top-left-origin device coordinates.
pub struct PoseInferenceAdapter<E> {
    engine: E,
    max_hands: usize,
}

impl<E: HandposeEngine> PoseInferenceAdapter<E> {
    pub fn new(engine: E, max_hands: usize) -> Self {
        Self { engine, max_hands }
    }

    pub fn detect(&mut self, image: &Frame) -> Result<Vec<Point>> {
        let observations = self.engine.detect_hands(image, self.max_hands)?;
        Ok(observations
            .iter()
            .take(self.max_hands)
            .flat_map(|hand| hand.landmarks.iter().map(|p| Point::new(p.x, 1.0 - p.y)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    struct ScriptedEngine {
        hands: Vec<HandObservation>,
        seen_max: Option<usize>,
    }

    impl HandposeEngine for ScriptedEngine {
        fn detect_hands(&mut self, _image: &Frame, max_hands: usize) -> Result<Vec<HandObservation>> {
            self.seen_max = Some(max_hands);
            Ok(self.hands.clone())
        }
    }

    struct FailingEngine;

    impl HandposeEngine for FailingEngine {
        fn detect_hands(&mut self, _image: &Frame, _max_hands: usize) -> Result<Vec<HandObservation>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn hand(points: &[(f32, f32)]) -> HandObservation {
        HandObservation {
            landmarks: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            confidence: 0.9,
        }
    }

    fn image() -> Frame {
        Frame::new(vec![0; 4], 1, 1)
    }

    #[test]
    fn flips_every_point_vertically() {
        let mut adapter = PoseInferenceAdapter::new(
            ScriptedEngine {
                hands: vec![hand(&[(0.1, 0.2), (0.3, 0.75)]), hand(&[(0.9, 0.0)])],
                seen_max: None,
            },
            2,
        );

        let points = adapter.detect(&image()).unwrap();
        let originals = [(0.1, 0.2), (0.3, 0.75), (0.9, 0.0)];
        assert_eq!(points.len(), originals.len());
        for (p, (x, y)) in points.iter().zip(originals) {
            assert_eq!(p.x, x);
            assert_eq!(p.y, 1.0 - y);
        }
        assert_eq!(adapter.engine.seen_max, Some(2));
    }

    #[test]
    fn never_returns_more_than_max_hands() {
        let mut adapter = PoseInferenceAdapter::new(
            ScriptedEngine {
                hands: vec![hand(&[(0.1, 0.1)]), hand(&[(0.2, 0.2)]), hand(&[(0.3, 0.3)])],
                seen_max: None,
            },
            2,
        );
        assert_eq!(adapter.detect(&image()).unwrap().len(), 2);
    }

    #[test]
    fn no_hands_is_an_empty_list() {
        let mut adapter = PoseInferenceAdapter::new(
            ScriptedEngine {
                hands: Vec::new(),
                seen_max: None,
            },
            2,
        );
        assert!(adapter.detect(&image()).unwrap().is_empty());
    }

    #[test]
    fn engine_errors_propagate() {
        let mut adapter = PoseInferenceAdapter::new(FailingEngine, 2);
        assert!(adapter.detect(&image()).is_err());
    }
}
