use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

pub const LANDMARK_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;
pub const NUM_LANDMARKS: usize = 21;

fn check_buffer(frame: &Frame) -> Result<()> {
    if frame.rgba.len() != frame.expected_len() {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            frame.expected_len()
        ));
    }
    Ok(())
}

/// Placement of a frame inside a square, zero-padded model input.
#[derive(Clone, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    /// Resizes `frame` to fit a `size`×`size` NHWC tensor with values in `[0, 1]`.
    pub fn fit(frame: &Frame, size: u32) -> Result<(Array4<f32>, Letterbox)> {
        check_buffer(frame)?;

        let scale = size as f32 / frame.width.max(frame.height) as f32;
        let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);

        let src = fir::images::ImageRef::new(
            frame.width,
            frame.height,
            &frame.rgba,
            fir::PixelType::U8x4,
        )?;
        let mut resized = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        fir::Resizer::new()
            .resize(&src, &mut resized, Some(&options))
            .context("fast resize failed")?;
        let resized = resized.into_vec();

        let pad_x = (size - new_w) / 2;
        let pad_y = (size - new_h) / 2;
        let side = size as usize;
        let mut data = vec![0f32; side * side * 3];
        data.par_chunks_exact_mut(side * 3)
            .enumerate()
            .for_each(|(row, out)| {
                let Some(src_row) = (row as u32).checked_sub(pad_y).filter(|r| *r < new_h) else {
                    return;
                };
                let src_start = src_row as usize * new_w as usize * 4;
                let src = &resized[src_start..src_start + new_w as usize * 4];
                let dst = &mut out[pad_x as usize * 3..(pad_x + new_w) as usize * 3];
                for (px, rgb) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
                    rgb[0] = px[0] as f32 / 255.0;
                    rgb[1] = px[1] as f32 / 255.0;
                    rgb[2] = px[2] as f32 / 255.0;
                }
            });

        let tensor = Array4::from_shape_vec((1, side, side, 3), data)
            .map_err(|err| anyhow!("failed to build letterbox tensor: {err}"))?;
        Ok((
            tensor,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
                orig_w: frame.width,
                orig_h: frame.height,
            },
        ))
    }
}

/// Rotated square window of a frame, fed to the landmark model.
#[derive(Clone, Debug, PartialEq)]
pub struct SquareCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl SquareCrop {
    pub fn sample(&self, frame: &Frame) -> Result<Array4<f32>> {
        check_buffer(frame)?;

        let size = self.size as usize;
        let mut data = vec![0f32; size * size * 3];
        data.par_chunks_exact_mut(size * 3)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, rgb) in row.chunks_exact_mut(3).enumerate() {
                    let (sx, sy) = self.to_source(x as f32 + 0.5, y as f32 + 0.5);
                    rgb.copy_from_slice(&bilinear(frame, sx, sy));
                }
            });

        Array4::from_shape_vec((1, size, size, 3), data)
            .map_err(|err| anyhow!("failed to build crop tensor: {err}"))
    }

    /// Maps crop pixel coordinates back into the source frame.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.size as f32 / 2.0;
        let scale = self.side / self.size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Like [`Self::to_source`] but clamped to the frame bounds.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let (sx, sy) = self.to_source(x, y);
        (
            sx.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            sy.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
        )
    }
}

fn bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let fetch = |px: f32, py: f32| -> [f32; 3] {
        let (ix, iy) = (px as i64, py as i64);
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = c00[c] + (c10[c] - c00[c]) * fx;
        let bottom = c01[c] + (c11[c] - c01[c]) * fx;
        out[c] = top + (bottom - top) * fy;
    }
    out
}

/// Splits the landmark model's flat `[x, y, z, ...]` output into points.
pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }
    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}
