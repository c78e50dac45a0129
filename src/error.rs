use thiserror::Error;

/// Failures that end the running capture session and are shown to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("capture session setup failed: {reason}")]
    CaptureSessionSetup { reason: String },
    #[error("capture interrupted: {reason}")]
    CaptureInterrupted { reason: String },
    #[error("hand pose inference failed: {message}")]
    Inference { message: String },
    #[error("hand pose model unavailable: {message}")]
    ModelUnavailable { message: String },
}

impl AppError {
    pub fn capture_setup(reason: impl Into<String>) -> Self {
        AppError::CaptureSessionSetup {
            reason: reason.into(),
        }
    }

    pub fn capture_interrupted(reason: impl Into<String>) -> Self {
        AppError::CaptureInterrupted {
            reason: reason.into(),
        }
    }

    pub fn inference(err: &anyhow::Error) -> Self {
        AppError::Inference {
            message: format!("{err:#}"),
        }
    }

    pub fn model_unavailable(err: &anyhow::Error) -> Self {
        AppError::ModelUnavailable {
            message: format!("{err:#}"),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AppError::CaptureSessionSetup { .. } => "Camera Setup Error",
            AppError::CaptureInterrupted { .. } => "Camera Error",
            AppError::Inference { .. } => "Hand Pose Error",
            AppError::ModelUnavailable { .. } => "Model Error",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            AppError::CaptureSessionSetup { reason }
            | AppError::CaptureInterrupted { reason } => reason,
            AppError::Inference { message } | AppError::ModelUnavailable { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_error_keeps_context_chain() {
        let err = anyhow::anyhow!("tensor shape mismatch").context("failed to run ORT session");
        let app = AppError::inference(&err);
        assert_eq!(app.title(), "Hand Pose Error");
        assert_eq!(
            app.detail(),
            "failed to run ORT session: tensor shape mismatch"
        );
    }

    #[test]
    fn setup_error_displays_reason() {
        let err = AppError::capture_setup("Could not find a front facing camera.");
        assert_eq!(
            err.to_string(),
            "capture session setup failed: Could not find a front facing camera."
        );
    }
}
