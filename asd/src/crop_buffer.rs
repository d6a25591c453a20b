//! Per-track crop window ring

use crate::preprocess::{crop_rect_for, preprocess_face, CropRect, PAD_VALUE};
use crate::ring::ChunkedRing;
use facetrack::{Frame, Rect};
use ndarray::Array3;

/// Ring of preprocessed face crops for one track.
///
/// Writes go through the preprocessor; in skip mode only the crop rect
/// metadata advances, leaving the stored window untouched.
#[derive(Debug, Clone)]
pub struct CropBuffer {
    ring: ChunkedRing,
    crop_size: u32,
    crop_scale: f32,
    last_crop_rect: Option<CropRect>,
}

impl CropBuffer {
    pub fn new(
        crop_size: u32,
        length: usize,
        front_padding: usize,
        back_padding: usize,
        crop_scale: f32,
    ) -> Self {
        Self {
            ring: ChunkedRing::new(
                (crop_size * crop_size) as usize,
                length,
                front_padding,
                back_padding,
                PAD_VALUE,
            ),
            crop_size,
            crop_scale,
            last_crop_rect: None,
        }
    }

    /// Derive the crop square from `detection_rect`, then preprocess the
    /// frame into the next chunk. With `skip` set, only the crop rect
    /// metadata is refreshed.
    pub fn write(&mut self, frame: &Frame, detection_rect: Rect, skip: bool) {
        let crop = crop_rect_for(
            &detection_rect,
            frame.width(),
            frame.height(),
            self.crop_scale,
        );
        self.last_crop_rect = Some(crop);
        if skip {
            return;
        }
        let size = self.crop_size;
        preprocess_face(frame, crop, size, self.ring.next_chunk_mut());
    }

    /// The most recent `len`-crop window as a `(len, H, W)` array.
    pub fn window(&self, len: usize) -> Array3<f32> {
        let side = self.crop_size as usize;
        let flat = self.ring.window(-1, len).to_owned();
        flat.into_shape_with_order((len, side, side))
            .expect("window reshape")
    }

    pub fn last_crop_rect(&self) -> Option<CropRect> {
        self.last_crop_rect
    }

    pub fn written(&self) -> usize {
        self.ring.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn white_frame() -> Frame {
        Frame::filled(64, 64, [255, 255, 255, 255])
    }

    #[test]
    fn test_write_then_window() {
        let mut buf = CropBuffer::new(8, 4, 1, 2, 0.4);
        let det = Rect::new(0.3, 0.3, 0.4, 0.4);
        for _ in 0..4 {
            buf.write(&white_frame(), det, false);
        }
        let w = buf.window(4);
        assert_eq!(w.shape(), &[4, 8, 8]);
        // Interior of a white frame crop is full luma.
        assert_abs_diff_eq!(w[[3, 4, 4]], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_skip_mode_freezes_window() {
        let mut buf = CropBuffer::new(8, 4, 1, 2, 0.4);
        let det = Rect::new(0.3, 0.3, 0.4, 0.4);
        buf.write(&white_frame(), det, false);
        let written_before = buf.written();
        buf.write(&white_frame(), Rect::new(0.5, 0.5, 0.2, 0.2), true);
        assert_eq!(buf.written(), written_before);
        // Metadata still advanced.
        let crop = buf.last_crop_rect().unwrap();
        let expected = crop_rect_for(&Rect::new(0.5, 0.5, 0.2, 0.2), 64, 64, 0.4);
        assert_eq!(crop, expected);
    }

    #[test]
    fn test_unwritten_window_is_padding() {
        let buf = CropBuffer::new(8, 4, 1, 2, 0.4);
        let w = buf.window(4);
        assert_abs_diff_eq!(w[[0, 0, 0]], PAD_VALUE, epsilon = 1e-6);
    }
}
