//! Per-track temporal buffers coupled to the tracker
//!
//! Owns one crop ring and one score ring per live identity; runs the
//! tracker each sample, feeds fresh crops through preprocessing, and
//! assembles speaker records from track metadata plus the latest
//! scores.

use crate::config::AsdConfig;
use crate::crop_buffer::CropBuffer;
use crate::score_buffer::ScoreBuffer;
use crate::timestamps::TimestampBuffer;
use crate::types::SpeakerData;
use facetrack::{Frame, Orientation, TrackSnapshot, Tracker};
use ndarray::Array3;
use std::collections::HashMap;
use uuid::Uuid;

struct VideoRecord {
    crop_buffer: CropBuffer,
    score_buffer: ScoreBuffer,
    last_snapshot: TrackSnapshot,
    last_update_time: f64,
}

pub struct VideoProcessor {
    tracker: Tracker,
    records: HashMap<Uuid, VideoRecord>,
    score_timestamps: TimestampBuffer,
    config: AsdConfig,
}

impl VideoProcessor {
    pub fn new(tracker: Tracker, config: AsdConfig) -> Self {
        Self {
            tracker,
            records: HashMap::new(),
            score_timestamps: TimestampBuffer::new(
                config.video_length + config.score_buffer_padding,
            ),
            config,
        }
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Scoring-frame update: run the tracker, write one preprocessed
    /// crop per surviving track, and report current speakers.
    pub fn update_videos_and_get_speakers(
        &mut self,
        t: f64,
        frame: &Frame,
        orientation: Orientation,
    ) -> facetrack::Result<Vec<SpeakerData>> {
        let snapshots = self.advance(t, frame, orientation, false)?;
        Ok(self.speakers_for(&snapshots))
    }

    /// Inference-frame update: advance tracks and crop metadata without
    /// preprocessing, and hand back each record's current crop window.
    pub fn update_tracks_and_get_frames(
        &mut self,
        t: f64,
        frame: &Frame,
        orientation: Orientation,
    ) -> facetrack::Result<HashMap<Uuid, Array3<f32>>> {
        let snapshots = self.advance(t, frame, orientation, true)?;
        let video_length = self.config.video_length;
        Ok(snapshots
            .iter()
            .filter_map(|s| {
                self.records
                    .get(&s.id)
                    .map(|r| (s.id, r.crop_buffer.window(video_length)))
            })
            .collect())
    }

    /// Apply one batch of classifier outputs and report the speakers
    /// whose scores just changed.
    pub fn update_scores_and_get_speakers(
        &mut self,
        t: f64,
        scores_by_id: &HashMap<Uuid, Vec<f32>>,
    ) -> Vec<SpeakerData> {
        let count = self.config.score_write_count;
        let mut updated = Vec::new();
        for (id, scores) in scores_by_id {
            let Some(record) = self.records.get_mut(id) else {
                // The track went away between window read and inference.
                log::debug!("dropping scores for vanished track {id}");
                continue;
            };
            record.score_buffer.write(scores, count);
            updated.push(record.last_snapshot.clone());
        }
        if !updated.is_empty() {
            self.score_timestamps.write(t, count);
        }
        self.speakers_for(&updated)
    }

    pub fn score_timestamps(&self) -> &TimestampBuffer {
        &self.score_timestamps
    }

    fn advance(
        &mut self,
        t: f64,
        frame: &Frame,
        orientation: Orientation,
        skip_preprocessing: bool,
    ) -> facetrack::Result<Vec<TrackSnapshot>> {
        let snapshots = self.tracker.update(frame, orientation)?;

        for snapshot in &snapshots {
            if !snapshot.rect.is_valid() {
                continue;
            }
            let record = self.records.entry(snapshot.id).or_insert_with(|| {
                log::debug!("opening video record for track {}", snapshot.id);
                VideoRecord {
                    crop_buffer: CropBuffer::new(
                        self.config.frame_size,
                        self.config.video_length,
                        self.config.crop_front_padding,
                        self.config.crop_back_padding,
                        self.config.crop_padding,
                    ),
                    score_buffer: ScoreBuffer::new(
                        self.config.video_length,
                        self.config.score_buffer_padding,
                    ),
                    last_snapshot: snapshot.clone(),
                    last_update_time: t,
                }
            });
            record
                .crop_buffer
                .write(frame, snapshot.rect, skip_preprocessing);
            record.last_snapshot = snapshot.clone();
            record.last_update_time = t;
        }

        // Records whose track did not survive this sample fall away.
        self.records.retain(|id, record| {
            let keep = record.last_update_time >= t;
            if !keep {
                log::debug!("closing video record for track {id}");
            }
            keep
        });

        Ok(snapshots)
    }

    fn speakers_for(&self, snapshots: &[TrackSnapshot]) -> Vec<SpeakerData> {
        snapshots
            .iter()
            .filter_map(|s| {
                self.records.get(&s.id).map(|record| SpeakerData {
                    id: s.id,
                    rect: s.rect,
                    status: s.status,
                    misses: s.misses,
                    score: record.score_buffer.last(),
                    cost_summary: s.cost_summary.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetrack::{
        FaceDetector, FaceEmbedder, FaceProcessor, Observation, Rect, TrackerConfig,
        EMBEDDING_LEN,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ToggleDetector(Arc<AtomicBool>);

    impl FaceDetector for ToggleDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _orientation: Orientation,
        ) -> Result<Vec<Observation>, String> {
            if self.0.load(Ordering::SeqCst) {
                Ok(vec![Observation {
                    rect: Rect::new(0.4, 0.4, 0.2, 0.2),
                    confidence: 0.9,
                }])
            } else {
                Ok(vec![])
            }
        }

        fn name(&self) -> &str {
            "toggle"
        }
    }

    struct AxisEmbedder;

    impl FaceEmbedder for AxisEmbedder {
        fn embed_batch(
            &mut self,
            _frame: &Frame,
            rects: &[Rect],
            _orientation: Orientation,
        ) -> Result<Vec<Vec<f32>>, String> {
            Ok(rects
                .iter()
                .map(|_| {
                    let mut e = vec![0.0; EMBEDDING_LEN];
                    e[0] = 1.0;
                    e
                })
                .collect())
        }

        fn name(&self) -> &str {
            "axis"
        }
    }

    fn build(present: Arc<AtomicBool>) -> VideoProcessor {
        let config = AsdConfig {
            frame_size: 16,
            ..AsdConfig::default()
        };
        let fp = FaceProcessor::new(
            Box::new(ToggleDetector(present)),
            Box::new(AxisEmbedder),
            &TrackerConfig::default(),
        );
        VideoProcessor::new(Tracker::new(fp, config.tracker.clone()), config)
    }

    fn frame() -> Frame {
        Frame::filled(64, 64, [200, 180, 160, 255])
    }

    #[test]
    fn test_crop_window_and_score_round_trip() {
        let present = Arc::new(AtomicBool::new(true));
        let mut vp = build(Arc::clone(&present));

        let mut t = 0.0;
        for _ in 0..5 {
            let speakers = vp
                .update_videos_and_get_speakers(t, &frame(), Orientation::Up)
                .unwrap();
            assert_eq!(speakers.len(), 1);
            assert_eq!(speakers[0].score, 0.0);
            t += 1.0 / 30.0;
        }
        assert_eq!(vp.num_records(), 1);

        let windows = vp
            .update_tracks_and_get_frames(t, &frame(), Orientation::Up)
            .unwrap();
        assert_eq!(windows.len(), 1);
        let (id, window) = windows.into_iter().next().unwrap();
        assert_eq!(window.shape(), &[25, 16, 16]);

        let mut scores = HashMap::new();
        scores.insert(id, vec![0.6; 25]);
        let speakers = vp.update_scores_and_get_speakers(t, &scores);
        assert_eq!(speakers.len(), 1);
        approx::assert_abs_diff_eq!(speakers[0].score, 0.6, epsilon = 1e-6);
        assert_eq!(vp.score_timestamps().last_write_time(), t);
    }

    #[test]
    fn test_stale_records_pruned() {
        let present = Arc::new(AtomicBool::new(true));
        let mut vp = build(Arc::clone(&present));

        let mut t = 0.0;
        for _ in 0..3 {
            vp.update_videos_and_get_speakers(t, &frame(), Orientation::Up)
                .unwrap();
            t += 1.0 / 30.0;
        }
        assert_eq!(vp.num_records(), 1);

        // A pending track dies on its first miss and the record with it.
        present.store(false, Ordering::SeqCst);
        vp.update_videos_and_get_speakers(t, &frame(), Orientation::Up)
            .unwrap();
        assert_eq!(vp.num_records(), 0);
    }

    #[test]
    fn test_scores_for_vanished_track_dropped() {
        let present = Arc::new(AtomicBool::new(true));
        let mut vp = build(present);
        vp.update_videos_and_get_speakers(0.0, &frame(), Orientation::Up)
            .unwrap();
        let mut scores = HashMap::new();
        scores.insert(uuid::Uuid::new_v4(), vec![0.9; 25]);
        let speakers = vp.update_scores_and_get_speakers(0.1, &scores);
        assert!(speakers.is_empty());
        // No timestamp advance for an empty update.
        assert_eq!(vp.score_timestamps().last_write_time(), 0.0);
    }
}
