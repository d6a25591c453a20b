//! Facade over the face detector and embedder backends

use crate::config::TrackerConfig;
use crate::detection::{Detection, Observation};
use crate::error::{Result, TrackError};
use crate::frame::{Frame, Orientation};
use std::time::{Duration, Instant};

/// Common interface for face detectors.
///
/// Implementations wrap an ML backend; observations come back in the
/// detector-declared order with normalized rects and confidences.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        orientation: Orientation,
    ) -> std::result::Result<Vec<Observation>, String>;

    /// Backend name, for logging.
    fn name(&self) -> &str;
}

/// Common interface for face embedders. One call per batch; rects are
/// clipped to the unit square before invocation.
pub trait FaceEmbedder: Send {
    fn embed_batch(
        &mut self,
        frame: &Frame,
        rects: &[crate::rect::Rect],
        orientation: Orientation,
    ) -> std::result::Result<Vec<Vec<f32>>, String>;

    fn name(&self) -> &str;
}

/// Bookkeeping for warm embedder request slots.
///
/// A floor of pre-warmed requests is kept ready; extra slots are added on
/// demand and expired once idle past their lifespan.
#[derive(Debug)]
struct RequestSlots {
    last_used: Vec<Instant>,
    min_ready: usize,
    lifespan: Duration,
}

impl RequestSlots {
    fn new(min_ready: usize, lifespan: Duration) -> Self {
        let now = Instant::now();
        Self {
            last_used: vec![now; min_ready],
            min_ready,
            lifespan,
        }
    }

    /// Make sure `needed` slots exist, expiring stale ones first.
    fn reserve(&mut self, needed: usize) {
        let now = Instant::now();
        let lifespan = self.lifespan;
        self.last_used.retain(|used| now - *used < lifespan);
        while self.last_used.len() < needed.max(self.min_ready) {
            self.last_used.push(now);
        }
        for used in self.last_used.iter_mut().take(needed) {
            *used = now;
        }
    }

    fn ready(&self) -> usize {
        self.last_used.len()
    }
}

/// Thin facade coupling the detector and embedder behind one interface
/// the tracker drives.
pub struct FaceProcessor {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn FaceEmbedder>,
    slots: RequestSlots,
    confidence_threshold: f32,
    next_detection_id: u32,
}

impl FaceProcessor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            detector,
            embedder,
            slots: RequestSlots::new(
                config.min_ready_embedder_requests,
                Duration::from_secs_f32(config.embedder_request_lifespan),
            ),
            confidence_threshold: config.confidence_threshold,
            next_detection_id: 0,
        }
    }

    /// Detect faces on `frame`, apply the confidence floor and the rect
    /// widening that compensates the detector's horizontal bias.
    pub fn detect(&mut self, frame: &Frame, orientation: Orientation) -> Result<Vec<Detection>> {
        let observations = self
            .detector
            .detect(frame, orientation)
            .map_err(TrackError::detector)?;

        let mut detections = Vec::with_capacity(observations.len());
        for obs in observations {
            if obs.confidence < self.confidence_threshold {
                continue;
            }
            let mut rect = obs.rect;
            // Widen 20% on each side of x; the detector crops cheeks.
            rect.x -= 0.2 * rect.width;
            rect.width *= 1.4;

            let id = self.next_detection_id;
            self.next_detection_id = self.next_detection_id.wrapping_add(1);
            detections.push(Detection::new(id, rect, obs.confidence));
        }
        Ok(detections)
    }

    /// Fill embeddings in place for `detections`. Backend failure leaves
    /// the embeddings empty, which downstream appearance gates reject.
    pub fn embed(
        &mut self,
        frame: &Frame,
        detections: &mut [&mut Detection],
        orientation: Orientation,
    ) {
        if detections.is_empty() {
            return;
        }
        self.slots.reserve(detections.len());

        let rects: Vec<_> = detections
            .iter()
            .map(|d| d.rect.clipped_to_unit())
            .collect();
        match self.embedder.embed_batch(frame, &rects, orientation) {
            Ok(embeddings) => {
                for (detection, embedding) in detections.iter_mut().zip(embeddings) {
                    detection.embedding = Some(embedding);
                }
            }
            Err(e) => {
                log::warn!(
                    "embedder {} failed for {} detections: {}",
                    self.embedder.name(),
                    detections.len(),
                    e
                );
            }
        }
    }

    pub fn ready_embedder_requests(&self) -> usize {
        self.slots.ready()
    }
}
