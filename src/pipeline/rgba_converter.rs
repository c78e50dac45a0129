use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Decodes a captured buffer into an RGBA frame. Empty buffers yield `None`.
pub fn decode_pixel_buffer(buffer: &Buffer) -> Result<Option<Frame>> {
    let resolution = buffer.resolution();
    let data = buffer.buffer();
    if data.is_empty() || resolution.width_x == 0 || resolution.height_y == 0 {
        return Ok(None);
    }

    let rgba = to_rgba(
        buffer.source_frame_format(),
        data,
        resolution.width_x,
        resolution.height_y,
    )?;
    Ok(Some(Frame::new(rgba, resolution.width_x, resolution.height_y)))
}

pub fn to_rgba(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    match format {
        FrameFormat::NV12 => nv12(data, width, height),
        FrameFormat::YUYV => yuyv(data, width, height),
        FrameFormat::MJPEG => mjpeg(data, width, height),
        FrameFormat::RAWRGB => packed_rgb(data, width, height, false),
        FrameFormat::RAWBGR => packed_rgb(data, width, height, true),
        FrameFormat::GRAY => gray(data, width, height),
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn require_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

// Bi-planar 4:2:0, full range: the layout the capture output asks for first.
fn nv12(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let luma_len = pixel_count(width, height);
    let chroma_len = luma_len / 2;
    require_len("NV12", data, luma_len + chroma_len)?;

    let planes = YuvBiPlanarImage {
        y_plane: &data[..luma_len],
        y_stride: width,
        uv_plane: &data[luma_len..luma_len + chroma_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &planes,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    require_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn mjpeg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    require_len("MJPEG", &rgba, pixel_count(width, height) * 4)?;
    Ok(rgba)
}

fn packed_rgb(data: &[u8], width: u32, height: u32, bgr: bool) -> Result<Vec<u8>> {
    require_len(if bgr { "BGR" } else { "RGB" }, data, pixel_count(width, height) * 3)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if bgr { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });
    Ok(rgba)
}

fn gray(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let count = pixel_count(width, height);
    require_len("GRAY", data, count)?;

    let mut rgba = vec![0u8; count * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data[..count].par_iter())
        .for_each(|(dst, &v)| dst.copy_from_slice(&[v, v, v, 255]));
    Ok(rgba)
}
