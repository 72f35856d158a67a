use std::collections::VecDeque;

/// Default intensity window length.
pub const DEFAULT_BUFFER_CAPACITY: usize = 128;

/// Bounded FIFO of intensity samples.
///
/// - Holds at most `capacity` samples in acquisition order
/// - Evicts the oldest sample once full
/// - Capacity is fixed at construction and never grows
#[derive(Clone, Debug)]
pub struct IntensityBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl IntensityBuffer {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when at capacity.
    pub fn push(&mut self, sample: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Owned copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Fraction of the window filled so far, in `[0, 1]`.
    pub fn fill_ratio(&self) -> f64 {
        self.samples.len() as f64 / self.capacity as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for IntensityBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_full() {
        let mut buf = IntensityBuffer::new(4);
        for i in 0..4 {
            buf.push(i as f64);
        }
        assert!(buf.is_full());
        buf.push(4.0);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.snapshot(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut buf = IntensityBuffer::new(2);
        buf.push(1.0);
        let snap = buf.snapshot();
        buf.push(2.0);
        buf.push(3.0);
        assert_eq!(snap, vec![1.0]);
    }

    #[test]
    fn fill_ratio_tracks_warmup() {
        let mut buf = IntensityBuffer::new(8);
        assert_eq!(buf.fill_ratio(), 0.0);
        for _ in 0..2 {
            buf.push(0.0);
        }
        assert_eq!(buf.fill_ratio(), 0.25);
        assert_eq!(IntensityBuffer::new(0).capacity(), 1);
    }
}
