//! Timestamp ring parallel to a chunked score store

/// Circular store of monotonically non-decreasing timestamps.
///
/// Each `write(t, k)` inserts `k` timestamps linearly interpolated
/// strictly between the previous `last_write_time` and `t`, with the
/// last written cell equal to `t` exactly. `index_of` maps a time back
/// to the negative chunk index of the nearest cell.
#[derive(Debug, Clone)]
pub struct TimestampBuffer {
    data: Vec<f64>,
    capacity: usize,
    write_index: usize,
    written: usize,
    last_write_time: f64,
}

impl TimestampBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            data: vec![0.0; capacity],
            capacity,
            write_index: 0,
            written: 0,
            last_write_time: 0.0,
        }
    }

    pub fn last_write_time(&self) -> f64 {
        self.last_write_time
    }

    pub fn len(&self) -> usize {
        self.written.min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Append `count` interpolated timestamps ending at `t`.
    pub fn write(&mut self, t: f64, count: usize) {
        let mut t = t;
        if t < self.last_write_time {
            log::warn!(
                "timestamp going backwards ({} < {}); clamping",
                t,
                self.last_write_time
            );
            t = self.last_write_time;
        }
        let prev = self.last_write_time;
        for j in 1..=count {
            let value = prev + (t - prev) * j as f64 / count as f64;
            self.data[self.write_index] = value;
            self.write_index = (self.write_index + 1) % self.capacity;
            self.written += 1;
        }
        self.last_write_time = t;
    }

    /// Timestamp at negative index (`-1` is the most recent cell).
    pub fn at(&self, idx: isize) -> f64 {
        debug_assert!(idx < 0 && (-idx) as usize <= self.len());
        let back = (-idx) as usize;
        let pos = (self.write_index + self.capacity - back) % self.capacity;
        self.data[pos]
    }

    /// Negative index of the cell nearest `t`, by interpolation search
    /// over the live window. `index_of(last_write_time) == -1`.
    pub fn index_of(&self, t: f64) -> isize {
        let n = self.len() as isize;
        if n == 0 {
            return -1;
        }
        let newest = self.at(-1);
        let oldest = self.at(-n);
        if t >= newest {
            return -1;
        }
        if t <= oldest {
            return -n;
        }

        // Interpolation search: guess from the value distribution, then
        // tighten the bracket like a binary search would.
        let mut lo = -n; // at(lo) <= t
        let mut hi = -1isize; // at(hi) >= t
        while hi - lo > 1 {
            let vlo = self.at(lo);
            let vhi = self.at(hi);
            let mid = if vhi > vlo {
                let frac = (t - vlo) / (vhi - vlo);
                let guess = lo + ((hi - lo) as f64 * frac).round() as isize;
                guess.clamp(lo + 1, hi - 1)
            } else {
                (lo + hi) / 2
            };
            if self.at(mid) <= t {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        if (t - self.at(lo)).abs() <= (self.at(hi) - t).abs() {
            lo
        } else {
            hi
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_write_interpolates_to_t() {
        let mut ts = TimestampBuffer::new(10);
        ts.write(1.0, 1);
        ts.write(2.0, 4);
        assert_abs_diff_eq!(ts.at(-1), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ts.at(-2), 1.75, epsilon = 1e-9);
        assert_abs_diff_eq!(ts.at(-3), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(ts.at(-4), 1.25, epsilon = 1e-9);
        assert_abs_diff_eq!(ts.at(-5), 1.0, epsilon = 1e-9);
        assert_eq!(ts.last_write_time(), 2.0);
    }

    #[test]
    fn test_index_of_last_write_is_minus_one() {
        let mut ts = TimestampBuffer::new(8);
        for i in 1..=6 {
            ts.write(i as f64, 1);
        }
        assert_eq!(ts.index_of(ts.last_write_time()), -1);
    }

    #[test]
    fn test_index_of_nearest() {
        let mut ts = TimestampBuffer::new(16);
        for i in 0..10 {
            ts.write(i as f64 * 0.1, 1);
        }
        // Live window is [0.0 .. 0.9] at indices -10..-1.
        assert_eq!(ts.index_of(0.9), -1);
        assert_eq!(ts.index_of(0.86), -1);
        assert_eq!(ts.index_of(0.84), -2);
        assert_eq!(ts.index_of(0.0), -10);
        assert_eq!(ts.index_of(-5.0), -10);
        assert_eq!(ts.index_of(100.0), -1);
    }

    #[test]
    fn test_index_of_monotonic() {
        let mut ts = TimestampBuffer::new(32);
        for i in 0..20 {
            ts.write(0.2 * i as f64, 1);
        }
        let mut last = isize::MIN;
        let mut q = 0.0;
        while q < 4.2 {
            let idx = ts.index_of(q);
            assert!(idx >= last, "index_of not monotonic at {q}");
            last = idx;
            q += 0.05;
        }
    }

    #[test]
    fn test_backwards_time_clamped() {
        let mut ts = TimestampBuffer::new(8);
        ts.write(5.0, 1);
        ts.write(3.0, 1);
        assert_eq!(ts.last_write_time(), 5.0);
        assert_eq!(ts.at(-1), 5.0);
    }

    #[test]
    fn test_batch_writes_at_inference_cadence() {
        // The score path writes five interpolated stamps per inference
        // frame; lookups inside the window land on the right cell.
        let mut ts = TimestampBuffer::new(30);
        ts.write(0.2, 5);
        ts.write(0.4, 5);
        assert_eq!(ts.index_of(ts.last_write_time()), -1);
        assert_abs_diff_eq!(ts.at(-6), 0.2, epsilon = 1e-9);
        assert_eq!(ts.index_of(0.2), -6);
        // Between two interpolated cells, the nearer one wins.
        assert_eq!(ts.index_of(0.33), -3);
        assert_eq!(ts.index_of(0.35), -2);
    }

    #[test]
    fn test_wraps_over_capacity() {
        let mut ts = TimestampBuffer::new(4);
        for i in 1..=9 {
            ts.write(i as f64, 1);
        }
        assert_eq!(ts.len(), 4);
        assert_eq!(ts.at(-1), 9.0);
        assert_eq!(ts.at(-4), 6.0);
        assert_eq!(ts.index_of(6.2), -4);
    }
}
