use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::pipeline::inference::LandmarkModels;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    HandposeEstimator,
    PalmDetector,
}

impl ModelKind {
    pub fn filename(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose_estimation_mediapipe_2023feb.onnx",
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
        }
    }

    fn url(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => {
                "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx"
            }
            ModelKind::PalmDetector => {
                "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx"
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose estimator",
            ModelKind::PalmDetector => "palm detector",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

pub fn model_path(dir: &Path, model: ModelKind) -> PathBuf {
    dir.join(model.filename())
}

/// Makes sure both models exist under `dir`, downloading what is missing.
pub fn ensure_models_ready(dir: &Path) -> anyhow::Result<LandmarkModels> {
    let models = LandmarkModels {
        palm_detector: model_path(dir, ModelKind::PalmDetector),
        handpose_estimator: model_path(dir, ModelKind::HandposeEstimator),
    };
    ensure_model_ready(ModelKind::PalmDetector, &models.palm_detector, with_progress_bar())?;
    ensure_model_ready(
        ModelKind::HandposeEstimator,
        &models.handpose_estimator,
        with_progress_bar(),
    )?;
    Ok(models)
}

pub fn ensure_model_ready<F>(model: ModelKind, path: &Path, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(model, model.url(), path, &mut on_event)
        .with_context(|| format!("failed to download {} model", model.label()))
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { model, total });

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("failed while writing model to disk")?;
        downloaded += read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

fn with_progress_bar() -> impl FnMut(ModelDownloadEvent) {
    let mut progress: Option<ProgressBar> = None;
    move |event| match event {
        ModelDownloadEvent::Started { total, .. } => {
            progress = Some(create_progress_bar(total));
        }
        ModelDownloadEvent::Progress { downloaded, .. } => {
            if let Some(pb) = progress.as_ref() {
                pb.set_position(downloaded);
            }
        }
        ModelDownloadEvent::Finished { model } => {
            if let Some(pb) = progress.take() {
                pb.finish_with_message(format!("{} model ready", model.label()));
            }
        }
        ModelDownloadEvent::AlreadyPresent { model } => {
            log::debug!("{} model already present", model.label());
        }
    }
}

fn create_progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_model_is_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("hand-pose-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = model_path(&dir, ModelKind::PalmDetector);
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(ModelKind::PalmDetector, &path, |e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::PalmDetector
                },
                ModelDownloadEvent::Finished {
                    model: ModelKind::PalmDetector
                },
            ]
        );

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn model_paths_live_in_the_model_dir() {
        let path = model_path(Path::new("models"), ModelKind::HandposeEstimator);
        assert_eq!(
            path,
            PathBuf::from("models/handpose_estimation_mediapipe_2023feb.onnx")
        );
    }
}
