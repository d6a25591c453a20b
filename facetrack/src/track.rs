//! Per-identity track state and lifecycle

use crate::config::TrackerConfig;
use crate::detection::{cosine_distance, Detection, EMBEDDING_LEN};
use crate::error::{Result, TrackError};
use crate::kalman::{Measurement, VisualKalmanFilter};
use crate::rect::{self, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle states of a track.
///
/// New tracks are PENDING until enough hits accumulate, ACTIVE while
/// observed, and INACTIVE after a run of misses. Deletion is a separate
/// predicate (`is_deletable`), not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    Pending,
    Active,
    Inactive,
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Association costs recorded for a (track, detection) pair.
///
/// `iou` is stored in cost form (`1 - IoU`) so that lower is better for
/// both components. Either component may be absent when the producing
/// gate did not run for the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AssociationCosts {
    pub iou: Option<f32>,
    pub appearance: Option<f32>,
}

impl AssociationCosts {
    pub fn has_appearance(&self) -> bool {
        self.appearance.is_some()
    }

    /// Fused cost: `motion_weight * iou + (1 - motion_weight) * appearance`
    /// when both are present, otherwise whichever one is.
    pub fn total(&self, motion_weight: f32) -> f32 {
        match (self.iou, self.appearance) {
            (Some(m), Some(a)) => motion_weight * m + (1.0 - motion_weight) * a,
            (Some(m), None) => m,
            (None, Some(a)) => a,
            (None, None) => f32::INFINITY,
        }
    }

    pub fn summary(&self, motion_weight: f32) -> String {
        let fmt_opt = |v: Option<f32>| match v {
            Some(v) => format!("{v:.3}"),
            None => "-".to_string(),
        };
        format!(
            "iou={} app={} total={:.3}",
            fmt_opt(self.iou),
            fmt_opt(self.appearance),
            self.total(motion_weight)
        )
    }
}

/// A persistent face identity.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: Uuid,
    status: TrackStatus,
    pub filter: VisualKalmanFilter,
    /// Appearance embedding, refreshed by EMA while not INACTIVE.
    embedding: Vec<f32>,
    /// Running estimate of the appearance cost of accepted matches.
    avg_appearance_cost: f32,
    /// Positive: consecutive hits since the last status transition.
    /// Negative: consecutive misses.
    hits: i32,
    iters_until_embed_update: u32,
    is_permanent: bool,
    last_costs: AssociationCosts,
    config: TrackerConfig,
}

impl Track {
    /// Spawn a PENDING track from a detection. The detection must carry an
    /// embedding; the tracker drops embedding-less detections before this.
    pub fn new(detection: &Detection, config: TrackerConfig) -> Result<Self> {
        let embedding = detection
            .embedding
            .clone()
            .ok_or(TrackError::DetectionWithoutEmbedding(detection.id))?;
        Ok(Self {
            id: Uuid::new_v4(),
            status: TrackStatus::Pending,
            filter: Self::filter_for(detection.rect, &config),
            embedding,
            avg_appearance_cost: config.max_appearance_cost / 2.0,
            hits: 1,
            iters_until_embed_update: 0,
            is_permanent: false,
            last_costs: AssociationCosts::default(),
            config,
        })
    }

    /// Register a permanent track from an external embedding. With a
    /// detection the track starts ACTIVE at the detection's box; without
    /// one it starts INACTIVE and is matched purely by appearance.
    pub fn new_permanent(
        embedding: Vec<f32>,
        detection: Option<&Detection>,
        config: TrackerConfig,
    ) -> Result<Self> {
        if embedding.len() != EMBEDDING_LEN {
            return Err(TrackError::EmbeddingShapeMismatch {
                expected: EMBEDDING_LEN,
                actual: embedding.len(),
            });
        }
        let (status, rect) = match detection {
            Some(d) => (TrackStatus::Active, d.rect),
            None => (TrackStatus::Inactive, Rect::invalid()),
        };
        Ok(Self {
            id: Uuid::new_v4(),
            status,
            filter: Self::filter_for(rect, &config),
            embedding,
            avg_appearance_cost: config.max_appearance_cost / 2.0,
            hits: 0,
            iters_until_embed_update: 0,
            is_permanent: true,
            last_costs: AssociationCosts::default(),
            config,
        })
    }

    fn filter_for(rect: Rect, config: &TrackerConfig) -> VisualKalmanFilter {
        VisualKalmanFilter::new(
            rect,
            config.dt,
            config.velocity_damping,
            config.growth_damping,
        )
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn rect(&self) -> Rect {
        self.filter.rect()
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn hits(&self) -> i32 {
        self.hits
    }

    /// Consecutive misses, zero while on a hit streak.
    pub fn misses(&self) -> i32 {
        (-self.hits).max(0)
    }

    pub fn last_costs(&self) -> AssociationCosts {
        self.last_costs
    }

    pub fn is_permanent(&self) -> bool {
        self.is_permanent
    }

    /// Mark permanent: never auto-deleted.
    pub fn retain(&mut self) {
        self.is_permanent = true;
    }

    pub fn release(&mut self) {
        self.is_permanent = false;
    }

    pub fn is_deletable(&self) -> bool {
        match self.status {
            TrackStatus::Pending => self.hits <= 0,
            _ => !self.is_permanent && self.hits <= -self.config.deletion_threshold,
        }
    }

    /// PENDING tracks always refresh their embedding; ACTIVE tracks on the
    /// configured cadence; INACTIVE embeddings are frozen.
    pub fn needs_embedding_update(&self) -> bool {
        match self.status {
            TrackStatus::Pending => true,
            TrackStatus::Active => self.iters_until_embed_update == 0,
            TrackStatus::Inactive => false,
        }
    }

    /// Advance the motion model one step.
    pub fn predict(&mut self) {
        self.filter.predict();
        self.iters_until_embed_update = self.iters_until_embed_update.saturating_sub(1);
    }

    /// Fold in a matched detection: status transition, filter update and,
    /// outside INACTIVE, the appearance EMA.
    pub fn register_hit(&mut self, detection: &Detection, costs: AssociationCosts) {
        // A hit always flips a miss streak into a fresh hit streak.
        self.hits = self.hits.max(0) + 1;

        match self.status {
            TrackStatus::Pending => {
                if self.hits >= self.config.confirmation_threshold {
                    self.transition(TrackStatus::Active);
                }
            }
            TrackStatus::Inactive => {
                if self.hits >= self.config.activation_threshold {
                    self.transition(TrackStatus::Active);
                }
            }
            TrackStatus::Active => {}
        }

        if self.filter.is_valid() {
            self.filter
                .update(Measurement::from_column_slice(&detection.rect.to_z()));
        } else {
            // A NaN state never recovers through an update; re-seed at
            // the detection. Happens for permanent tracks registered
            // without a box.
            self.filter = Self::filter_for(detection.rect, &self.config);
        }

        if self.status != TrackStatus::Inactive && costs.has_appearance() {
            self.update_embedding(detection, costs.appearance.unwrap());
        }

        self.iters_until_embed_update = self.config.iterations_per_embedding_update;
        self.last_costs = costs;
    }

    fn update_embedding(&mut self, detection: &Detection, appearance: f32) {
        let Some(incoming) = detection.embedding.as_deref() else {
            return;
        };
        let alpha = self.config.embedding_alpha
            * detection.confidence
            * (-appearance / (self.avg_appearance_cost + 1e-10)).exp();
        self.avg_appearance_cost += alpha * (appearance - self.avg_appearance_cost);
        for (slot, &new) in self.embedding.iter_mut().zip(incoming) {
            *slot = alpha * new + (1.0 - alpha) * *slot;
        }
    }

    /// Account a frame without a matching detection.
    pub fn register_miss(&mut self) {
        match self.status {
            TrackStatus::Active => {
                self.hits = self.hits.min(0) - 1;
                if self.hits <= -self.config.deactivation_threshold {
                    self.filter.deactivate();
                    self.transition(TrackStatus::Inactive);
                } else {
                    self.filter.damp();
                }
            }
            TrackStatus::Inactive => {
                self.hits -= 1;
            }
            TrackStatus::Pending => {
                self.hits = 0;
            }
        }
    }

    fn transition(&mut self, to: TrackStatus) {
        log::debug!("track {} {} -> {}", self.id, self.status, to);
        self.status = to;
        self.hits = 0;
    }

    pub fn cosine_distance(&self, detection: &Detection) -> f32 {
        match detection.embedding.as_deref() {
            Some(e) => cosine_distance(&self.embedding, e),
            None => 2.0,
        }
    }

    pub fn iou(&self, detection: &Detection) -> f32 {
        rect::iou(&self.rect(), &detection.rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_embedding(axis: usize) -> Vec<f32> {
        let mut e = vec![0.0; EMBEDDING_LEN];
        e[axis] = 1.0;
        e
    }

    fn detection_at(rect: Rect, axis: usize) -> Detection {
        let mut d = Detection::new(0, rect, 0.9);
        d.embedding = Some(unit_embedding(axis));
        d
    }

    fn hit_costs(appearance: f32) -> AssociationCosts {
        AssociationCosts {
            iou: Some(0.1),
            appearance: Some(appearance),
        }
    }

    #[test]
    fn test_new_track_is_pending_with_one_hit() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let t = Track::new(&d, TrackerConfig::default()).unwrap();
        assert_eq!(t.status(), TrackStatus::Pending);
        assert_eq!(t.hits(), 1);
        assert!(t.needs_embedding_update());
    }

    #[test]
    fn test_creation_without_embedding_fails() {
        let d = Detection::new(7, Rect::new(0.4, 0.4, 0.2, 0.2), 0.9);
        let err = Track::new(&d, TrackerConfig::default()).unwrap_err();
        assert!(matches!(err, TrackError::DetectionWithoutEmbedding(7)));
    }

    #[test]
    fn test_confirmation_after_threshold_hits() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let mut t = Track::new(&d, config.clone()).unwrap();
        // Starts with 1 hit; needs confirmation_threshold accumulated.
        for _ in 0..(config.confirmation_threshold - 1) {
            assert_eq!(t.status(), TrackStatus::Pending);
            t.predict();
            t.register_hit(&d, hit_costs(0.05));
        }
        assert_eq!(t.status(), TrackStatus::Active);
        assert_eq!(t.hits(), 0);
    }

    #[test]
    fn test_pending_miss_makes_deletable() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let mut t = Track::new(&d, TrackerConfig::default()).unwrap();
        assert!(!t.is_deletable());
        t.register_miss();
        assert!(t.is_deletable());
    }

    #[test]
    fn test_deactivation_after_miss_run() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let mut t = Track::new(&d, config.clone()).unwrap();
        for _ in 0..config.confirmation_threshold {
            t.register_hit(&d, hit_costs(0.05));
        }
        assert_eq!(t.status(), TrackStatus::Active);
        for _ in 0..config.deactivation_threshold {
            t.predict();
            t.register_miss();
        }
        assert_eq!(t.status(), TrackStatus::Inactive);
        assert_eq!(t.hits(), 0);
        assert_eq!(t.filter.velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_reactivation_clamps_miss_count() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let mut t = Track::new(&d, config.clone()).unwrap();
        for _ in 0..config.confirmation_threshold {
            t.register_hit(&d, hit_costs(0.05));
        }
        for _ in 0..config.deactivation_threshold {
            t.register_miss();
        }
        // Long absence piles up negative hits.
        for _ in 0..20 {
            t.register_miss();
        }
        assert_eq!(t.status(), TrackStatus::Inactive);
        assert!(t.misses() >= 20);
        // Two hits reactivate regardless of the accumulated misses.
        t.register_hit(&d, hit_costs(0.05));
        assert_eq!(t.status(), TrackStatus::Inactive);
        t.register_hit(&d, hit_costs(0.05));
        assert_eq!(t.status(), TrackStatus::Active);
    }

    #[test]
    fn test_inactive_track_reaches_deletion() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let mut config = TrackerConfig::default();
        config.deletion_threshold = 10;
        let mut t = Track::new(&d, config.clone()).unwrap();
        for _ in 0..config.confirmation_threshold {
            t.register_hit(&d, hit_costs(0.05));
        }
        for _ in 0..config.deactivation_threshold {
            t.register_miss();
        }
        for _ in 0..(config.deletion_threshold - 1) {
            t.register_miss();
        }
        assert!(!t.is_deletable());
        t.register_miss();
        assert!(t.is_deletable());
    }

    #[test]
    fn test_permanent_track_never_deletable() {
        let mut config = TrackerConfig::default();
        config.deletion_threshold = 5;
        let mut t =
            Track::new_permanent(unit_embedding(3), None, config).unwrap();
        assert_eq!(t.status(), TrackStatus::Inactive);
        for _ in 0..50 {
            t.register_miss();
        }
        assert!(!t.is_deletable());
        t.release();
        assert!(t.is_deletable());
    }

    #[test]
    fn test_permanent_embedding_shape_checked() {
        let err = Track::new_permanent(vec![1.0; 64], None, TrackerConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            TrackError::EmbeddingShapeMismatch {
                expected: EMBEDDING_LEN,
                actual: 64
            }
        ));
    }

    #[test]
    fn test_embedding_ema_pulls_toward_detection() {
        let d0 = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let mut t = Track::new(&d0, TrackerConfig::default()).unwrap();
        let d1 = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 1);
        let before = t.cosine_distance(&d1);
        t.register_hit(&d1, hit_costs(0.2));
        let after = t.cosine_distance(&d1);
        assert!(after < before);
        // The frozen-INACTIVE rule: no EMA without appearance cost.
        let snapshot = t.embedding().to_vec();
        t.register_hit(
            &d1,
            AssociationCosts {
                iou: Some(0.1),
                appearance: None,
            },
        );
        assert_eq!(t.embedding(), &snapshot[..]);
    }

    #[test]
    fn test_embedding_frozen_while_inactive() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let mut t = Track::new(&d, config.clone()).unwrap();
        for _ in 0..config.confirmation_threshold {
            t.register_hit(&d, hit_costs(0.05));
        }
        for _ in 0..config.deactivation_threshold {
            t.register_miss();
        }
        assert_eq!(t.status(), TrackStatus::Inactive);
        let snapshot = t.embedding().to_vec();
        let other = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 5);
        // First reactivation hit arrives while still INACTIVE.
        t.register_hit(&other, hit_costs(0.1));
        assert_eq!(t.embedding(), &snapshot[..]);
    }

    #[test]
    fn test_embed_update_cadence() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let mut t = Track::new(&d, config.clone()).unwrap();
        for _ in 0..config.confirmation_threshold {
            t.register_hit(&d, hit_costs(0.05));
        }
        assert!(!t.needs_embedding_update());
        for _ in 0..config.iterations_per_embedding_update {
            t.predict();
        }
        assert!(t.needs_embedding_update());
    }

    #[test]
    fn test_avg_appearance_cost_seed() {
        let d = detection_at(Rect::new(0.4, 0.4, 0.2, 0.2), 0);
        let config = TrackerConfig::default();
        let t = Track::new(&d, config.clone()).unwrap();
        assert_abs_diff_eq!(
            t.avg_appearance_cost,
            config.max_appearance_cost / 2.0,
            epsilon = 1e-6
        );
    }
}
