use std::path::PathBuf;

use anyhow::{Context, Result};
use hand_pose_preview::{
    config::PreviewConfig,
    model_download::ensure_models_ready,
    overlay::draw_markers,
    pipeline::{
        inference::{OrtEngine, PoseInferenceAdapter},
        sampler::FrameSampler,
    },
    types::Frame,
};
use image::RgbaImage;

const DEFAULT_INPUT: &str = "demos/hand.png";
const DEFAULT_OUTPUT: &str = "demos/hand_with_keypoints.png";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input_image = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    let output_image = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let config = PreviewConfig::from_env()?;
    let source = image::open(&input_image)
        .with_context(|| format!("failed to open image {}", input_image.display()))?
        .to_rgba8();
    let (width, height) = source.dimensions();
    let frame = Frame::new(source.into_raw(), width, height);

    let mut sampler = FrameSampler::new(
        config.sample_scale,
        config.analysis_width,
        config.analysis_height,
    );
    let mut analysed = sampler.sample(&frame)?;

    let models = ensure_models_ready(&config.model_dir)?;
    let engine = OrtEngine::new(&models, config.min_hand_confidence)?;
    let mut adapter = PoseInferenceAdapter::new(engine, config.max_hands);

    let points = adapter.detect(&analysed).context("inference failed")?;
    println!(
        "{} keypoints in {}x{} analysis window of {}",
        points.len(),
        analysed.width,
        analysed.height,
        input_image.display()
    );

    draw_markers(
        &mut analysed.rgba,
        analysed.width,
        analysed.height,
        &points,
        4,
        [255, 149, 0, 255],
    );
    let canvas = RgbaImage::from_raw(analysed.width, analysed.height, analysed.rgba)
        .context("analysed frame has an invalid buffer")?;
    canvas
        .save(&output_image)
        .with_context(|| format!("failed to save {}", output_image.display()))?;

    println!("Wrote {}", output_image.display());
    Ok(())
}
