//! Active speaker detection runtime
//!
//! Couples the tracking core in `facetrack` with per-identity temporal
//! stores and a pooled speaker classifier: every camera sample advances
//! the tracker and the per-track crop rings, and one sample per skip
//! cycle fans its crop windows out across the model pool, writing
//! is-speaking scores back into the per-track score rings.
//!
//! The classifier itself is a trait object ([`classifier::SpeakerClassifier`]);
//! see [`orchestrator::AsdPipeline`] for the entry point.

pub mod classifier;
pub mod config;
pub mod crop_buffer;
pub mod error;
pub mod model_pool;
pub mod orchestrator;
pub mod preprocess;
pub mod ring;
pub mod score_buffer;
pub mod stubs;
pub mod timestamps;
pub mod types;
pub mod video_processor;

pub use classifier::SpeakerClassifier;
pub use config::AsdConfig;
pub use crop_buffer::CropBuffer;
pub use error::{AsdError, Result};
pub use model_pool::{ModelPool, PooledModel};
pub use orchestrator::{AsdPipeline, VideoSample};
pub use score_buffer::ScoreBuffer;
pub use timestamps::TimestampBuffer;
pub use types::SpeakerData;
pub use video_processor::VideoProcessor;
