//! Error types for the face tracking library

use thiserror::Error;

/// Result type alias for the tracking library
pub type Result<T> = std::result::Result<T, TrackError>;

/// Errors that can occur during tracking operations
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("embedding has {actual} components, expected {expected}")]
    EmbeddingShapeMismatch { expected: usize, actual: usize },

    #[error("detection {0} has no embedding")]
    DetectionWithoutEmbedding(u32),

    #[error("face detector failed: {0}")]
    DetectorError(String),

    #[error("face embedder failed: {0}")]
    EmbedderError(String),

    #[error("assignment solver failed: {0}")]
    Assignment(#[from] crate::rlap::RlapError),
}

impl TrackError {
    pub fn detector<S: Into<String>>(msg: S) -> Self {
        Self::DetectorError(msg.into())
    }

    pub fn embedder<S: Into<String>>(msg: S) -> Self {
        Self::EmbedderError(msg.into())
    }
}
