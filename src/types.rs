use std::time::Instant;

/// RGBA8 image as handed between pipeline stages.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

/// One capture tick. `image` is `None` when the pixel buffer could not be read.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    pub image: Option<Frame>,
    pub captured_at: Instant,
}

impl SampleBuffer {
    pub fn with_image(frame: Frame) -> Self {
        Self {
            captured_at: frame.timestamp,
            image: Some(frame),
        }
    }

    pub fn empty() -> Self {
        Self {
            image: None,
            captured_at: Instant::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A detected hand. Landmarks are normalized to the analysed image with the
/// origin in the lower-left corner.
#[derive(Clone, Debug)]
pub struct HandObservation {
    pub landmarks: Vec<Point>,
    pub confidence: f32,
}

/// Palm detector output in analysed-image pixel space.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}
