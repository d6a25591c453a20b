//! Emitted value types

use facetrack::{Rect, TrackStatus};
use serde::Serialize;
use uuid::Uuid;

/// Per-identity record emitted to the consumer after every processed
/// sample: track metadata fused with the latest classifier score.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerData {
    pub id: Uuid,
    pub rect: Rect,
    pub status: TrackStatus,
    /// Consecutive frames without a matching detection.
    pub misses: i32,
    /// Latest is-speaking score for this identity.
    pub score: f32,
    /// Human-readable summary of the last association costs.
    pub cost_summary: String,
}
