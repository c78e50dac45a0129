use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;

use crate::types::Frame;

/// Downscales captured frames and cuts out the fixed analysis window.
pub struct FrameSampler {
    scale: f32,
    window: (u32, u32),
    resizer: fir::Resizer,
}

impl FrameSampler {
    pub fn new(scale: f32, window_width: u32, window_height: u32) -> Self {
        Self {
            scale,
            window: (window_width, window_height),
            resizer: fir::Resizer::new(),
        }
    }

    /// Scales `frame` by the sampler's factor and crops the result to the
    /// window anchored at the lower-left corner, the origin the detected
    /// points are expressed in. Frames that end up smaller than the window
    /// are returned whole.
    pub fn sample(&mut self, frame: &Frame) -> Result<Frame> {
        if frame.rgba.len() != frame.expected_len() {
            return Err(anyhow!(
                "frame buffer size mismatch: got {}, expected {}",
                frame.rgba.len(),
                frame.expected_len()
            ));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("cannot sample an empty frame"));
        }

        // Source region that lands inside the window once scaled.
        let src_w = (self.window.0 as f32 / self.scale).min(frame.width as f32);
        let src_h = (self.window.1 as f32 / self.scale).min(frame.height as f32);
        let out_w = ((src_w * self.scale).round() as u32).clamp(1, self.window.0);
        let out_h = ((src_h * self.scale).round() as u32).clamp(1, self.window.1);
        let src_top = frame.height as f32 - src_h;

        let src = fir::images::ImageRef::new(
            frame.width,
            frame.height,
            &frame.rgba,
            fir::PixelType::U8x4,
        )?;
        let mut dst = fir::images::Image::new(out_w, out_h, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear))
            .crop(0.0, src_top as f64, src_w as f64, src_h as f64);
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("failed to scale frame to analysis window")?;

        Ok(Frame {
            rgba: dst.into_vec(),
            width: out_w,
            height: out_h,
            timestamp: frame.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, left: [u8; 4], right: [u8; 4]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(if x < width / 2 { &left } else { &right });
            }
        }
        Frame::new(rgba, width, height)
    }

    fn banded(width: u32, height: u32, top_rows: u32, top: [u8; 4], rest: [u8; 4]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for _x in 0..width {
                rgba.extend_from_slice(if y < top_rows { &top } else { &rest });
            }
        }
        Frame::new(rgba, width, height)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * frame.width + x) * 4) as usize;
        frame.rgba[idx..idx + 4].try_into().unwrap()
    }

    #[test]
    fn halves_frames_that_fit_the_window() {
        let mut sampler = FrameSampler::new(0.5, 640, 480);
        let out = sampler
            .sample(&solid(1280, 960, [255, 0, 0, 255], [0, 0, 255, 255]))
            .unwrap();
        assert_eq!((out.width, out.height), (640, 480));
        assert_eq!(out.rgba.len(), 640 * 480 * 4);
        assert_eq!(pixel(&out, 10, 10), [255, 0, 0, 255]);
        assert_eq!(pixel(&out, 630, 470), [0, 0, 255, 255]);
    }

    #[test]
    fn crops_large_frames_instead_of_squashing() {
        let mut sampler = FrameSampler::new(0.5, 640, 480);
        // Left half of a 2560 wide frame covers exactly the 1280 source columns
        // that survive the crop.
        let out = sampler
            .sample(&solid(2560, 1440, [255, 0, 0, 255], [0, 0, 255, 255]))
            .unwrap();
        assert_eq!((out.width, out.height), (640, 480));
        assert_eq!(pixel(&out, 0, 240), [255, 0, 0, 255]);
        assert_eq!(pixel(&out, 320, 479), [255, 0, 0, 255]);

        // Vertically only the bottom 960 of 1440 rows survive.
        let out = sampler
            .sample(&banded(2560, 1440, 480, [255, 0, 0, 255], [0, 0, 255, 255]))
            .unwrap();
        assert_eq!((out.width, out.height), (640, 480));
        assert_eq!(pixel(&out, 320, 240), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 639, 479), [0, 0, 255, 255]);
    }

    #[test]
    fn window_keeps_the_bottom_rows_of_tall_frames() {
        let mut sampler = FrameSampler::new(0.5, 640, 480);
        // 1080 rows scale to 540, so the 120 source rows at the top fall
        // outside the window.
        let out = sampler
            .sample(&banded(1920, 1080, 120, [255, 0, 0, 255], [0, 0, 255, 255]))
            .unwrap();
        assert_eq!((out.width, out.height), (640, 480));

        // The filter may bleed a little of the boundary into the first row.
        let corner = pixel(&out, 0, 0);
        assert!(corner[2] > 200 && corner[0] < 64, "top-left pixel {corner:?}");
        for y in 1..out.height {
            assert_eq!(pixel(&out, 0, y), [0, 0, 255, 255], "row {y}");
            assert_eq!(pixel(&out, 639, y), [0, 0, 255, 255], "row {y}");
        }
    }

    #[test]
    fn small_frames_produce_a_smaller_window() {
        let mut sampler = FrameSampler::new(0.5, 640, 480);
        let out = sampler
            .sample(&solid(800, 600, [9, 9, 9, 255], [9, 9, 9, 255]))
            .unwrap();
        assert_eq!((out.width, out.height), (400, 300));
    }

    #[test]
    fn rejects_truncated_buffers() {
        let mut sampler = FrameSampler::new(0.5, 640, 480);
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(sampler.sample(&frame).is_err());
    }
}
