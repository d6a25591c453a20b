//! Run the full pipeline against a synthetic two-face scene.
//!
//! ```bash
//! RUST_LOG=info cargo run --example live_pipeline
//! ```

use asd::stubs::{
    MotionEnergyClassifier, SceneClock, SyntheticDetector, SyntheticEmbedder, SyntheticFace,
};
use asd::{AsdConfig, AsdPipeline, SpeakerClassifier, VideoProcessor, VideoSample};
use facetrack::{FaceProcessor, Frame, Orientation, Tracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let faces = vec![
        SyntheticFace {
            seed: 11,
            center: (0.3, 0.5),
            orbit_radius: 0.05,
            orbit_period_frames: 90.0,
            size: 0.18,
        },
        SyntheticFace {
            seed: 42,
            center: (0.7, 0.5),
            orbit_radius: 0.02,
            orbit_period_frames: 300.0,
            size: 0.18,
        },
    ];

    let config = AsdConfig::default();
    let clock = Arc::new(SceneClock::default());
    let face_processor = FaceProcessor::new(
        Box::new(SyntheticDetector::new(faces.clone(), Arc::clone(&clock))),
        Box::new(SyntheticEmbedder::new(faces, clock)),
        &config.tracker,
    );
    let tracker = Tracker::new(face_processor, config.tracker.clone());
    let video_processor = VideoProcessor::new(tracker, config.clone());

    let classifiers: Vec<Box<dyn SpeakerClassifier>> = (0..config.model_pool_size)
        .map(|_| Box::new(MotionEnergyClassifier::default()) as Box<dyn SpeakerClassifier>)
        .collect();

    let (speaker_tx, mut speaker_rx) = mpsc::channel(32);
    let (merge_tx, mut merge_rx) = mpsc::unbounded_channel();
    let mut pipeline = AsdPipeline::new(
        video_processor,
        classifiers,
        speaker_tx,
        merge_tx,
        config,
    )?;

    let printer = tokio::spawn(async move {
        let mut emitted = 0usize;
        while let Some(speakers) = speaker_rx.recv().await {
            emitted += 1;
            if emitted % 30 == 0 {
                for s in &speakers {
                    println!(
                        "{} {:>8} score={:.2} misses={} [{}]",
                        s.id, s.status.to_string(), s.score, s.misses, s.cost_summary
                    );
                }
            }
        }
        emitted
    });

    // Four seconds of 30 fps camera.
    for i in 0..120u32 {
        let frame = Frame::filled(640, 480, [96, 96, 96, 255]);
        pipeline.process_sample(VideoSample::new(
            frame,
            i as f64 / 30.0,
            Orientation::Up,
        ));
        tokio::time::sleep(Duration::from_millis(33)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    while let Ok(req) = merge_rx.try_recv() {
        println!("merge requested: {} -> {}", req.source_id, req.target_id);
    }
    let (scored, inferred) = pipeline.stats();
    println!("done: {scored} scoring frames, {inferred} inference frames");

    drop(pipeline);
    let emitted = printer.await?;
    println!("{emitted} emissions delivered");
    Ok(())
}
