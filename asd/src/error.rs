//! Error types for the active-speaker runtime

use thiserror::Error;

/// Result type alias for the runtime crate
pub type Result<T> = std::result::Result<T, AsdError>;

#[derive(Error, Debug)]
pub enum AsdError {
    /// Classifier backend failed for one window; the affected track's
    /// score is left unchanged.
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    /// Fatal at startup only.
    #[error("model load failed: {0}")]
    ModelLoadError(String),

    #[error("tracking failed: {0}")]
    Tracking(#[from] facetrack::TrackError),

    #[error("result sink closed")]
    SinkClosed,
}

impl AsdError {
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailure(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }
}
