//! Chunked circular store
//!
//! A contiguous buffer of equally shaped chunks with a moving write
//! head. The `length` most recent chunks are readable at negative
//! indices -1, -2, ...; `front_padding` older chunks stay physically
//! addressable so window reads can reach slightly into the past; and
//! `back_padding` chunks of headroom bound how often the wrap shift
//! runs. When the head hits capacity, the last `front_padding + length`
//! chunks move to the front of the buffer and writing continues.

use ndarray::{ArrayView1, ArrayView2};

#[derive(Debug, Clone)]
pub struct ChunkedRing {
    data: Vec<f32>,
    default_chunk: Vec<f32>,
    chunk_len: usize,
    length: usize,
    front_padding: usize,
    back_padding: usize,
    /// Next chunk slot, in chunks.
    write_index: usize,
    /// Total chunks ever written.
    written: usize,
}

impl ChunkedRing {
    pub fn new(
        chunk_len: usize,
        length: usize,
        front_padding: usize,
        back_padding: usize,
        fill: f32,
    ) -> Self {
        assert!(chunk_len > 0 && length > 0);
        let capacity = length + front_padding + back_padding;
        Self {
            data: vec![fill; capacity * chunk_len],
            default_chunk: vec![fill; chunk_len],
            chunk_len,
            length,
            front_padding,
            back_padding,
            // The pre-filled buffer stands in for history that was never
            // written, so the head starts past a full logical window.
            write_index: front_padding + length,
            written: 0,
        }
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn capacity(&self) -> usize {
        self.length + self.front_padding + self.back_padding
    }

    /// Slot for the next chunk. Wraps first when the head is at
    /// capacity: the trailing `front_padding + length` chunks move to
    /// offset zero and the head resets behind them.
    pub fn next_chunk_mut(&mut self) -> &mut [f32] {
        if self.write_index == self.capacity() {
            let keep = self.front_padding + self.length;
            let src = (self.write_index - keep) * self.chunk_len;
            self.data.copy_within(src.., 0);
            self.write_index = keep;
        }
        let start = self.write_index * self.chunk_len;
        self.write_index += 1;
        self.written += 1;
        &mut self.data[start..start + self.chunk_len]
    }

    /// Convenience write of one full chunk.
    pub fn push(&mut self, chunk: &[f32]) {
        debug_assert_eq!(chunk.len(), self.chunk_len);
        self.next_chunk_mut().copy_from_slice(chunk);
    }

    /// The `-idx`-th most recent chunk (`idx = -1` is the newest).
    ///
    /// Indices below the logical window, or beyond what has been
    /// written, read as the fill value.
    pub fn chunk(&self, idx: isize) -> ArrayView1<'_, f32> {
        debug_assert!(idx < 0);
        let back = (-idx) as usize;
        if back > self.length || back > self.written {
            return ArrayView1::from(&self.default_chunk[..]);
        }
        let start = (self.write_index - back) * self.chunk_len;
        ArrayView1::from(&self.data[start..start + self.chunk_len])
    }

    /// Mutable access to an already-written chunk inside the window.
    pub fn chunk_mut(&mut self, idx: isize) -> &mut [f32] {
        debug_assert!(idx < 0 && (-idx) as usize <= self.length + self.front_padding);
        let back = (-idx) as usize;
        let start = (self.write_index - back) * self.chunk_len;
        &mut self.data[start..start + self.chunk_len]
    }

    /// Contiguous window of `len` chunks ending at chunk `end_idx`
    /// (`end_idx = -1` ends at the newest chunk). `end_idx` may reach
    /// `front_padding` chunks past the window start.
    pub fn window(&self, end_idx: isize, len: usize) -> ArrayView2<'_, f32> {
        debug_assert!(end_idx < 0);
        let back = (-end_idx) as usize;
        assert!(
            len + back <= self.length + self.front_padding + 1,
            "window of {len} ending {back} back exceeds addressable history"
        );
        let end = self.write_index + 1 - back;
        let start = (end - len) * self.chunk_len;
        ArrayView2::from_shape((len, self.chunk_len), &self.data[start..end * self.chunk_len])
            .expect("window shape")
    }
}
