//! Camera frame handed through the pipeline

use std::sync::Arc;

/// Frame orientation as reported by the capture layer. Forwarded opaquely
/// to the detector and embedder backends, which handle rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

/// One camera frame: tightly packed RGBA8, top-down row-major.
///
/// The pixel payload is shared, not copied; frames are cheap to clone and
/// to move across task boundaries.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Uniform gray frame, mostly useful in tests.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self::new(data, width, height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
