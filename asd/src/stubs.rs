//! Synthetic ML backends
//!
//! Deterministic detector, embedder and classifier stand-ins for demos
//! and load tests while the real model integrations live out of tree.
//! The detector renders a configurable set of orbiting faces; the
//! embedder derives a stable unit vector per face seed; the classifier
//! scores windows by temporal luma variance.

use crate::classifier::SpeakerClassifier;
use facetrack::{FaceDetector, FaceEmbedder, Frame, Observation, Orientation, Rect, EMBEDDING_LEN};
use ndarray::{Array1, ArrayView3};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One synthetic face: a seed for its appearance and a circular path.
#[derive(Debug, Clone)]
pub struct SyntheticFace {
    pub seed: u64,
    pub center: (f32, f32),
    pub orbit_radius: f32,
    pub orbit_period_frames: f32,
    pub size: f32,
}

impl SyntheticFace {
    pub fn rect_at(&self, frame_index: u64) -> Rect {
        let phase =
            frame_index as f32 / self.orbit_period_frames * std::f32::consts::TAU;
        let cx = self.center.0 + self.orbit_radius * phase.cos();
        let cy = self.center.1 + self.orbit_radius * phase.sin();
        Rect::new(cx - self.size / 2.0, cy - self.size / 2.0, self.size, self.size)
    }
}

/// Shared scene clock: the detector advances it, the embedder reads it.
#[derive(Debug, Default)]
pub struct SceneClock {
    frame_index: AtomicU64,
}

/// Detector reporting the scene's faces along their orbits.
pub struct SyntheticDetector {
    faces: Vec<SyntheticFace>,
    clock: Arc<SceneClock>,
}

impl SyntheticDetector {
    pub fn new(faces: Vec<SyntheticFace>, clock: Arc<SceneClock>) -> Self {
        Self { faces, clock }
    }
}

impl FaceDetector for SyntheticDetector {
    fn detect(
        &mut self,
        _frame: &Frame,
        _orientation: Orientation,
    ) -> Result<Vec<Observation>, String> {
        let index = self.clock.frame_index.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .faces
            .iter()
            .map(|face| Observation {
                rect: face.rect_at(index),
                confidence: 0.9,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Deterministic unit embedding from a 64-bit seed (splitmix-style mix).
pub fn seeded_embedding(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut next = move || {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    };
    let mut e: Vec<f32> = (0..EMBEDDING_LEN)
        .map(|_| (next() as f64 / u64::MAX as f64) as f32 - 0.5)
        .collect();
    let norm = e.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut e {
        *x /= norm;
    }
    e
}

/// Embedder matching each requested rect to the nearest scene face at
/// the current clock frame and returning that face's seeded embedding.
pub struct SyntheticEmbedder {
    faces: Vec<SyntheticFace>,
    clock: Arc<SceneClock>,
}

impl SyntheticEmbedder {
    pub fn new(faces: Vec<SyntheticFace>, clock: Arc<SceneClock>) -> Self {
        Self { faces, clock }
    }
}

impl FaceEmbedder for SyntheticEmbedder {
    fn embed_batch(
        &mut self,
        _frame: &Frame,
        rects: &[Rect],
        _orientation: Orientation,
    ) -> Result<Vec<Vec<f32>>, String> {
        // The detector already advanced the clock for this frame.
        let index = self.clock.frame_index.load(Ordering::SeqCst).saturating_sub(1);
        Ok(rects
            .iter()
            .map(|rect| {
                self.faces
                    .iter()
                    .min_by(|a, b| {
                        let ra = a.rect_at(index);
                        let rb = b.rect_at(index);
                        let da = (ra.mid_x() - rect.mid_x()).abs()
                            + (ra.mid_y() - rect.mid_y()).abs();
                        let db = (rb.mid_x() - rect.mid_x()).abs()
                            + (rb.mid_y() - rect.mid_y()).abs();
                        da.partial_cmp(&db).unwrap()
                    })
                    .map(|face| seeded_embedding(face.seed))
                    .unwrap_or_else(|| vec![0.0; EMBEDDING_LEN])
            })
            .collect())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Classifier scoring each window position by local temporal variance
/// of mean crop luma. Motion between consecutive crops reads as speech
/// energy, which makes demos respond to the synthetic orbits.
pub struct MotionEnergyClassifier {
    pub gain: f32,
}

impl Default for MotionEnergyClassifier {
    fn default() -> Self {
        Self { gain: 400.0 }
    }
}

impl SpeakerClassifier for MotionEnergyClassifier {
    fn predict(&self, window: ArrayView3<'_, f32>) -> Result<Array1<f32>, String> {
        let t = window.shape()[0];
        let means: Vec<f32> = (0..t)
            .map(|i| window.index_axis(ndarray::Axis(0), i).mean().unwrap_or(0.0))
            .collect();
        let scores = (0..t)
            .map(|i| {
                let prev = if i == 0 { means[0] } else { means[i - 1] };
                let delta = (means[i] - prev).abs() * self.gain;
                delta.clamp(0.0, 1.0)
            })
            .collect();
        Ok(Array1::from_vec(scores))
    }

    fn name(&self) -> &str {
        "motion-energy"
    }
}
