//! Pipeline orchestrator
//!
//! Drives the per-sample pipeline: serialized intake with the skip
//! counter, one detached task per sample, pooled classifier fan-out on
//! inference frames, and in-order delivery of speaker records to the
//! consumer.

use crate::classifier::SpeakerClassifier;
use crate::config::AsdConfig;
use crate::error::{AsdError, Result};
use crate::model_pool::ModelPool;
use crate::types::SpeakerData;
use crate::video_processor::VideoProcessor;
use facetrack::{Frame, MergeRequest, Orientation};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

/// One camera sample entering the pipeline. The pixel buffer sits
/// behind a read lock shared with the capture layer.
#[derive(Clone)]
pub struct VideoSample {
    pub pixels: Arc<RwLock<Frame>>,
    pub timestamp: f64,
    pub orientation: Orientation,
}

impl VideoSample {
    pub fn new(frame: Frame, timestamp: f64, orientation: Orientation) -> Self {
        Self {
            pixels: Arc::new(RwLock::new(frame)),
            timestamp,
            orientation,
        }
    }
}

type Classifier = Box<dyn SpeakerClassifier>;
type Emission = (u64, Option<Vec<SpeakerData>>);

pub struct AsdPipeline {
    video: Arc<Mutex<VideoProcessor>>,
    pool: Arc<ModelPool<Classifier>>,
    config: AsdConfig,
    /// Intake-side sample counter for the skip policy.
    cycle_position: u32,
    next_seq: u64,
    emit_tx: mpsc::UnboundedSender<Emission>,
    samples_scored: u64,
    samples_inferred: u64,
}

impl std::fmt::Debug for AsdPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsdPipeline").finish_non_exhaustive()
    }
}

impl AsdPipeline {
    /// Build the pipeline. `classifiers` become the model pool; an empty
    /// pool is a startup failure, the only fatal error in the system.
    pub fn new(
        mut video_processor: VideoProcessor,
        classifiers: Vec<Classifier>,
        speaker_tx: mpsc::Sender<Vec<SpeakerData>>,
        merge_tx: mpsc::UnboundedSender<MergeRequest>,
        config: AsdConfig,
    ) -> Result<Self> {
        if classifiers.is_empty() {
            return Err(AsdError::model_load("no classifier instances supplied"));
        }
        log::info!(
            "starting ASD pipeline: {} classifier replicas, skip cycle {}",
            classifiers.len(),
            config.frame_skip_cycle
        );

        video_processor
            .tracker_mut()
            .set_merge_sink(Box::new(move |req| {
                if merge_tx.send(req).is_err() {
                    log::debug!("merge sink closed; dropping {:?}", req);
                }
            }));

        let (emit_tx, emit_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::emitter_loop(emit_rx, speaker_tx));

        Ok(Self {
            video: Arc::new(Mutex::new(video_processor)),
            pool: Arc::new(ModelPool::new(classifiers)),
            config,
            cycle_position: 0,
            next_seq: 0,
            emit_tx,
            samples_scored: 0,
            samples_inferred: 0,
        })
    }

    /// Intake one sample. Serialized by `&mut self`; the compute runs in
    /// a detached task so intake never blocks on inference.
    pub fn process_sample(&mut self, sample: VideoSample) {
        self.cycle_position += 1;
        let scoring = self.cycle_position < self.config.frame_skip_cycle;
        if !scoring {
            self.cycle_position = 0;
        }
        if scoring {
            self.samples_scored += 1;
        } else {
            self.samples_inferred += 1;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        log::debug!(
            "sample {} dispatched as {} frame (scored {}, inferred {})",
            seq,
            if scoring { "scoring" } else { "inference" },
            self.samples_scored,
            self.samples_inferred
        );

        let video = Arc::clone(&self.video);
        let pool = Arc::clone(&self.pool);
        let completion = Completion {
            seq,
            tx: self.emit_tx.clone(),
            sent: false,
        };

        tokio::spawn(async move {
            if scoring {
                Self::scoring_frame(video, sample, completion).await;
            } else {
                Self::inference_frame(video, pool, sample, completion).await;
            }
        });
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.samples_scored, self.samples_inferred)
    }

    async fn scoring_frame(
        video: Arc<Mutex<VideoProcessor>>,
        sample: VideoSample,
        completion: Completion,
    ) {
        let pixels = Arc::clone(&sample.pixels).read_owned().await;
        let mut vp = video.lock().await;
        let result =
            vp.update_videos_and_get_speakers(sample.timestamp, &pixels, sample.orientation);
        drop(vp);
        drop(pixels);

        match result {
            Ok(speakers) => completion.deliver(speakers),
            Err(e) => log::warn!("tracker update failed on scoring frame: {e}"),
        }
    }

    async fn inference_frame(
        video: Arc<Mutex<VideoProcessor>>,
        pool: Arc<ModelPool<Classifier>>,
        sample: VideoSample,
        completion: Completion,
    ) {
        let pixels = Arc::clone(&sample.pixels).read_owned().await;
        let windows = {
            let mut vp = video.lock().await;
            vp.update_tracks_and_get_frames(sample.timestamp, &pixels, sample.orientation)
        };
        drop(pixels);

        let windows = match windows {
            Ok(windows) => windows,
            Err(e) => {
                log::warn!("tracker update failed on inference frame: {e}");
                return;
            }
        };

        // One borrowed model per window, all predictions in flight at
        // once, bounded by the pool.
        let mut jobs = Vec::with_capacity(windows.len());
        for (id, window) in windows {
            let pool = Arc::clone(&pool);
            jobs.push(tokio::spawn(async move {
                let model = pool.borrow().await;
                let scores = tokio::task::spawn_blocking(move || {
                    let out = model.predict(window.view());
                    drop(model);
                    out
                })
                .await
                .unwrap_or_else(|e| Err(format!("inference task crashed: {e}")));
                (id, scores)
            }));
        }

        let mut scores_by_id: HashMap<Uuid, Vec<f32>> = HashMap::new();
        for job in jobs {
            match job.await {
                Ok((id, Ok(scores))) => {
                    scores_by_id.insert(id, scores.to_vec());
                }
                Ok((id, Err(e))) => {
                    // The track keeps its previous score.
                    log::warn!("inference failed for track {id}: {e}");
                }
                Err(e) => log::warn!("inference job lost: {e}"),
            }
        }

        let mut vp = video.lock().await;
        let speakers = vp.update_scores_and_get_speakers(sample.timestamp, &scores_by_id);
        drop(vp);
        completion.deliver(speakers);
    }

    /// Reorder buffer between detached tasks and the consumer: results
    /// for sample `i` never reach the sink before those for `i - 1`.
    async fn emitter_loop(
        mut rx: mpsc::UnboundedReceiver<Emission>,
        tx: mpsc::Sender<Vec<SpeakerData>>,
    ) {
        let mut next = 0u64;
        let mut held: BTreeMap<u64, Option<Vec<SpeakerData>>> = BTreeMap::new();
        while let Some((seq, data)) = rx.recv().await {
            held.insert(seq, data);
            while let Some(data) = held.remove(&next) {
                next += 1;
                if let Some(data) = data {
                    if tx.send(data).await.is_err() {
                        log::info!("speaker sink closed; emitter stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Completion token for one sample. Dropping it unsent (task failure or
/// cancellation) releases the sequence slot so later samples still flow.
struct Completion {
    seq: u64,
    tx: mpsc::UnboundedSender<Emission>,
    sent: bool,
}

impl Completion {
    fn deliver(mut self, data: Vec<SpeakerData>) {
        let _ = self.tx.send((self.seq, Some(data)));
        self.sent = true;
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.sent {
            let _ = self.tx.send((self.seq, None));
        }
    }
}
