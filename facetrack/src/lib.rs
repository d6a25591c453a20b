//! Appearance-aware multi-face tracking
//!
//! This crate is the tracking core of the live active-speaker pipeline:
//! per-track 7-state Kalman filters, a three-phase data-association
//! pipeline over gated IoU and cosine-embedding costs, and a rectangular
//! linear assignment solver for whatever ambiguity the gates leave.
//!
//! The ML models at the edges (face detector, face embedder) are trait
//! objects supplied by the caller; see [`face_processor`].

pub mod config;
pub mod detection;
pub mod error;
pub mod face_processor;
pub mod frame;
pub mod kalman;
pub mod rect;
pub mod rlap;
pub mod track;
pub mod tracker;

pub use config::TrackerConfig;
pub use detection::{cosine_distance, Detection, Observation, EMBEDDING_LEN};
pub use error::{Result, TrackError};
pub use face_processor::{FaceDetector, FaceEmbedder, FaceProcessor};
pub use frame::{Frame, Orientation};
pub use kalman::VisualKalmanFilter;
pub use rect::{iou, Rect};
pub use rlap::{Assignment, RlapError};
pub use track::{AssociationCosts, Track, TrackStatus};
pub use tracker::{MergeRequest, TrackSnapshot, Tracker};
