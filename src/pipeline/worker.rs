use std::{mem, path::Path, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};

use super::{
    inference::{HandposeEngine, OrtEngine, PoseInferenceAdapter},
    sampler::FrameSampler,
    session::SessionStopper,
};
use crate::{
    config::PreviewConfig,
    error::AppError,
    model_download::ensure_models_ready,
    overlay::LatestSlot,
    types::{Point, SampleBuffer},
};

/// Latest point list handed from the worker to the UI.
pub type PointSlot = Arc<LatestSlot<Vec<Point>>>;

/// Publishes whatever points were collected when dropped, so every exit path
/// of a frame refreshes the overlay.
struct PublishOnDrop<'a> {
    slot: &'a LatestSlot<Vec<Point>>,
    points: Vec<Point>,
}

impl Drop for PublishOnDrop<'_> {
    fn drop(&mut self) {
        self.slot.publish(mem::take(&mut self.points));
    }
}

/// Per-frame work of the background queue: sample, infer, publish.
pub struct FrameProcessor<E> {
    sampler: FrameSampler,
    adapter: PoseInferenceAdapter<E>,
    stopper: SessionStopper,
    points: PointSlot,
    errors: Sender<AppError>,
}

impl<E: HandposeEngine> FrameProcessor<E> {
    pub fn new(
        config: &PreviewConfig,
        engine: E,
        stopper: SessionStopper,
        points: PointSlot,
        errors: Sender<AppError>,
    ) -> Self {
        Self {
            sampler: FrameSampler::new(
                config.sample_scale,
                config.analysis_width,
                config.analysis_height,
            ),
            adapter: PoseInferenceAdapter::new(engine, config.max_hands),
            stopper,
            points,
            errors,
        }
    }

    pub fn process(&mut self, sample: SampleBuffer) {
        let mut published = PublishOnDrop {
            slot: &self.points,
            points: Vec::new(),
        };

        let Some(image) = sample.image else {
            return;
        };
        let scaled = match self.sampler.sample(&image) {
            Ok(scaled) => scaled,
            Err(err) => {
                log::warn!("failed to sample frame: {err:?}");
                return;
            }
        };

        match self.adapter.detect(&scaled) {
            Ok(points) => published.points = points,
            Err(err) => report_fatal(&self.stopper, &self.errors, AppError::inference(&err)),
        }
    }
}

/// Stops the session and surfaces `err`, unless the session was already
/// stopped by an earlier failure.
fn report_fatal(stopper: &SessionStopper, errors: &Sender<AppError>, err: AppError) {
    if stopper.stop() {
        log::error!("stopping capture session: {err}");
        let _ = errors.send(err);
    } else {
        log::debug!("session already stopped, ignoring: {err}");
    }
}

/// Drains samples until every sender is gone. Samples that arrive while the
/// session is stopped are discarded. The engine is built by `load` on the
/// first sample of a running session; a failed load stops the session and is
/// retried on the next sample after it restarts.
pub fn run_sample_loop<E, L>(
    config: &PreviewConfig,
    mut load: L,
    samples: Receiver<SampleBuffer>,
    stopper: SessionStopper,
    points: PointSlot,
    errors: Sender<AppError>,
) where
    E: HandposeEngine,
    L: FnMut() -> anyhow::Result<E>,
{
    let mut processor: Option<FrameProcessor<E>> = None;
    while let Some(sample) = recv_latest(&samples) {
        if !stopper.is_running() {
            continue;
        }
        if processor.is_none() {
            match load() {
                Ok(engine) => {
                    processor = Some(FrameProcessor::new(
                        config,
                        engine,
                        stopper.clone(),
                        points.clone(),
                        errors.clone(),
                    ));
                }
                Err(err) => {
                    log::error!("failed to prepare hand pose models: {err:?}");
                    points.publish(Vec::new());
                    report_fatal(&stopper, &errors, AppError::model_unavailable(&err));
                    continue;
                }
            }
        }
        if let Some(processor) = processor.as_mut() {
            processor.process(sample);
        }
    }
    log::debug!("sample channel closed, worker exiting");
}

fn recv_latest(samples: &Receiver<SampleBuffer>) -> Option<SampleBuffer> {
    let mut sample = samples.recv().ok()?;
    while let Ok(newer) = samples.try_recv() {
        sample = newer;
    }
    Some(sample)
}

/// Spawns the background queue. Models are prepared on the worker thread so a
/// first-run download never blocks the UI.
pub fn start_worker(
    config: PreviewConfig,
    samples: Receiver<SampleBuffer>,
    stopper: SessionStopper,
    points: PointSlot,
    errors: Sender<AppError>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("hand-pose-worker".into())
        .spawn(move || {
            run_sample_loop(
                &config,
                || load_engine(&config.model_dir, config.min_hand_confidence),
                samples,
                stopper,
                points,
                errors,
            );
        })
}

fn load_engine(model_dir: &Path, min_confidence: f32) -> anyhow::Result<OrtEngine> {
    let models = ensure_models_ready(model_dir)?;
    let engine = OrtEngine::new(&models, min_confidence)?;
    log::info!(
        "hand pose engine ready using {} and {}",
        models.palm_detector.display(),
        models.handpose_estimator.display()
    );
    Ok(engine)
}
