//! Tracker configuration

use serde::Deserialize;

/// All tunable constants of the tracking core.
///
/// Defaults come from offline calibration against the reference camera
/// rig at 30 fps; every field can be overridden by configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detector confidence floor applied by the face processor.
    pub confidence_threshold: f32,
    /// Motion gate: minimum IoU for a (track, detection) pair to survive
    /// the initial cost filter in the motion-gated phases.
    pub min_iou: f32,
    /// Appearance gate: maximum cosine distance between a track embedding
    /// and a detection embedding.
    pub max_appearance_cost: f32,
    /// Weight of the motion (IoU) cost in the fused assignment cost;
    /// the appearance cost gets `1 - motion_weight`.
    pub motion_weight: f32,
    /// Accumulated hits for PENDING -> ACTIVE.
    pub confirmation_threshold: i32,
    /// Consecutive hits for INACTIVE -> ACTIVE.
    pub activation_threshold: i32,
    /// Consecutive misses for ACTIVE -> INACTIVE.
    pub deactivation_threshold: i32,
    /// Consecutive misses after which an INACTIVE track is deleted
    /// (300 frames is 10 s at 30 fps).
    pub deletion_threshold: i32,
    /// Embedding refresh cadence for ACTIVE tracks, in predict steps.
    pub iterations_per_embedding_update: u32,
    /// Base rate of the appearance EMA.
    pub embedding_alpha: f32,
    /// Per-second velocity decay base; the per-frame factor is
    /// `velocity_damping^dt`.
    pub velocity_damping: f32,
    /// Per-second growth decay base; the per-frame factor is
    /// `growth_damping^dt`.
    pub growth_damping: f32,
    /// Kalman filter time step in seconds.
    pub dt: f32,
    /// Floor of pre-warmed embedder requests kept ready.
    pub min_ready_embedder_requests: usize,
    /// Idle lifetime of an embedder request before it is expired, seconds.
    pub embedder_request_lifespan: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            min_iou: 0.30,
            max_appearance_cost: 0.30,
            motion_weight: 0.10,
            confirmation_threshold: 15,
            activation_threshold: 2,
            deactivation_threshold: 8,
            deletion_threshold: 300,
            iterations_per_embedding_update: 5,
            embedding_alpha: 0.20,
            velocity_damping: 0.5,
            growth_damping: 0.1,
            dt: 1.0 / 30.0,
            min_ready_embedder_requests: 2,
            embedder_request_lifespan: 1.5,
        }
    }
}

impl TrackerConfig {
    /// Per-frame velocity damping multiplier.
    pub fn velocity_damping_per_frame(&self) -> f32 {
        self.velocity_damping.powf(self.dt)
    }

    /// Per-frame growth damping multiplier.
    pub fn growth_damping_per_frame(&self) -> f32 {
        self.growth_damping.powf(self.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibration() {
        let c = TrackerConfig::default();
        assert_eq!(c.confirmation_threshold, 15);
        assert_eq!(c.deactivation_threshold, 8);
        assert!(c.velocity_damping_per_frame() > 0.97);
        assert!(c.velocity_damping_per_frame() < 1.0);
    }

    #[test]
    fn test_deserialize_partial() {
        let c: TrackerConfig = serde_json::from_str(r#"{"min_iou": 0.5}"#).unwrap();
        assert_eq!(c.min_iou, 0.5);
        assert_eq!(c.max_appearance_cost, 0.30);
    }
}
