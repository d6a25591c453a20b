//! Runtime configuration

use facetrack::TrackerConfig;
use serde::Deserialize;

/// Configuration of the temporal-fusion runtime. Defaults match the
/// calibrated 30 fps pipeline with a 25-frame classifier window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsdConfig {
    /// Classifier window length T, in crops.
    pub video_length: usize,
    /// Side of the square face crop fed to the classifier.
    pub frame_size: u32,
    /// Crop padding scale around the detected face box.
    pub crop_padding: f32,
    /// Intake skip cycle; one sample per cycle runs inference.
    pub frame_skip_cycle: u32,
    /// Number of classifier replicas in the model pool.
    pub model_pool_size: usize,
    /// Scores appended to the ring per inference pass.
    pub score_write_count: usize,
    /// Extra addressable history ahead of the crop window.
    pub crop_front_padding: usize,
    /// Write headroom of the crop ring before a wrap shift.
    pub crop_back_padding: usize,
    /// Extra capacity of the score and score-timestamp rings.
    pub score_buffer_padding: usize,
    pub tracker: TrackerConfig,
}

impl Default for AsdConfig {
    fn default() -> Self {
        Self {
            video_length: 25,
            frame_size: 112,
            crop_padding: 0.40,
            frame_skip_cycle: 6,
            model_pool_size: 6,
            score_write_count: 5,
            crop_front_padding: 3,
            crop_back_padding: 25,
            score_buffer_padding: 5,
            tracker: TrackerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AsdConfig::default();
        assert_eq!(c.video_length, 25);
        assert_eq!(c.frame_size, 112);
        assert_eq!(c.frame_skip_cycle, 6);
        assert_eq!(c.model_pool_size, 6);
    }
}
