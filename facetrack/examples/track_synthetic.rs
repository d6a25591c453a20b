//! Drive the tracker with two synthetic faces crossing paths.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example track_synthetic
//! ```

use facetrack::{
    FaceDetector, FaceEmbedder, FaceProcessor, Frame, Observation, Orientation, Rect, Tracker,
    TrackerConfig, EMBEDDING_LEN,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn face_positions(frame_index: u64) -> [(Rect, usize); 2] {
    let t = (frame_index as f32 / 60.0).min(1.0);
    let xa = 0.15 + 0.55 * t;
    let xb = 0.70 - 0.55 * t;
    [
        (Rect::new(xa, 0.45, 0.16, 0.16), 0),
        (Rect::new(xb, 0.42, 0.16, 0.16), 1),
    ]
}

fn axis_embedding(axis: usize) -> Vec<f32> {
    let mut e = vec![0.0; EMBEDDING_LEN];
    e[axis] = 1.0;
    e
}

struct CrossingDetector(Arc<AtomicU64>);

impl FaceDetector for CrossingDetector {
    fn detect(
        &mut self,
        _frame: &Frame,
        _orientation: Orientation,
    ) -> Result<Vec<Observation>, String> {
        let i = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(face_positions(i)
            .into_iter()
            .map(|(rect, _)| Observation {
                rect,
                confidence: 0.92,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "crossing"
    }
}

struct CrossingEmbedder(Arc<AtomicU64>);

impl FaceEmbedder for CrossingEmbedder {
    fn embed_batch(
        &mut self,
        _frame: &Frame,
        rects: &[Rect],
        _orientation: Orientation,
    ) -> Result<Vec<Vec<f32>>, String> {
        let i = self.0.load(Ordering::SeqCst).saturating_sub(1);
        let faces = face_positions(i);
        Ok(rects
            .iter()
            .map(|rect| {
                let (_, axis) = faces
                    .iter()
                    .min_by(|(a, _), (b, _)| {
                        let da = (a.mid_x() - rect.mid_x()).abs();
                        let db = (b.mid_x() - rect.mid_x()).abs();
                        da.partial_cmp(&db).unwrap()
                    })
                    .unwrap();
                axis_embedding(*axis)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "crossing"
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let clock = Arc::new(AtomicU64::new(0));
    let config = TrackerConfig::default();
    let face_processor = FaceProcessor::new(
        Box::new(CrossingDetector(Arc::clone(&clock))),
        Box::new(CrossingEmbedder(clock)),
        &config,
    );
    let mut tracker = Tracker::new(face_processor, config);
    tracker.set_merge_sink(Box::new(|req| {
        println!("merge requested: {} -> {}", req.source_id, req.target_id);
    }));

    let frame = Frame::filled(640, 480, [80, 80, 80, 255]);
    for i in 0..90 {
        let snapshots = tracker.update(&frame, Orientation::Up)?;
        if i % 10 == 0 {
            println!("frame {i:>3}:");
            for s in &snapshots {
                println!(
                    "  {} {:>8} x={:.2} misses={} [{}]",
                    s.id,
                    s.status.to_string(),
                    s.rect.mid_x(),
                    s.misses,
                    s.cost_summary
                );
            }
        }
    }
    println!(
        "final population: {} active / {} pending / {} inactive",
        tracker.active_ids().len(),
        tracker.pending_ids().len(),
        tracker.inactive_ids().len()
    );
    Ok(())
}
