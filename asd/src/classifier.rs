//! Speaker classifier interface

use ndarray::{Array1, ArrayView3};

/// Common interface for speaker classification backends.
///
/// Input is one `(T, H, W)` window of BT.601 luma crops in `[0, 1]`,
/// padded with 110/255 outside the frame; output is one score per
/// window position.
pub trait SpeakerClassifier: Send + Sync {
    fn predict(&self, window: ArrayView3<'_, f32>) -> Result<Array1<f32>, String>;

    /// Backend name, for logging.
    fn name(&self) -> &str;
}

impl<T: SpeakerClassifier + ?Sized> SpeakerClassifier for Box<T> {
    fn predict(&self, window: ArrayView3<'_, f32>) -> Result<Array1<f32>, String> {
        (**self).predict(window)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
