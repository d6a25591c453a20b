//! Per-track score ring

use crate::ring::ChunkedRing;

/// Neutral score for cells nothing has been written to yet.
const DEFAULT_SCORE: f32 = 0.0;

/// Ring of scalar is-speaking scores, one cell per crop position.
///
/// Each classifier pass covers the whole crop window, but only the
/// trailing `count` positions are new; those open fresh cells, while the
/// leading scores rewrite their existing cells in place (last write
/// wins).
#[derive(Debug, Clone)]
pub struct ScoreBuffer {
    ring: ChunkedRing,
}

impl ScoreBuffer {
    pub fn new(length: usize, padding: usize) -> Self {
        Self {
            ring: ChunkedRing::new(1, length, padding, padding, DEFAULT_SCORE),
        }
    }

    /// Fold in one classifier output vector. The final `count` entries
    /// are appended as new cells; the rest overwrite the cells they
    /// already correspond to.
    pub fn write(&mut self, scores: &[f32], count: usize) {
        if scores.is_empty() {
            return;
        }
        let fresh = count.min(scores.len());
        let existing = scores.len() - fresh;

        // scores[existing - 1] lines up with the current newest cell.
        for (i, &score) in scores[..existing].iter().enumerate() {
            let idx = -((existing - i) as isize);
            if (-idx) as usize <= self.ring.written().min(self.ring.length()) {
                self.ring.chunk_mut(idx)[0] = score;
            }
        }
        for &score in &scores[existing..] {
            self.ring.push(&[score]);
        }
    }

    /// Latest score; neutral before any write.
    pub fn last(&self) -> f32 {
        self.ring.chunk(-1)[0]
    }

    pub fn at(&self, idx: isize) -> f32 {
        self.ring.chunk(idx)[0]
    }

    pub fn written(&self) -> usize {
        self.ring.written()
    }
}
