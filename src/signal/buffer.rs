//! Rolling sample buffer.
//!
//! Holds the most recent samples of one recording session. Consumers
//! never borrow the buffer across ticks; they take owned snapshots so an
//! append can never disturb a computation in progress.

use std::collections::VecDeque;

use super::Sample;

/// Smallest capacity that still fits one quality window.
pub const MIN_CAPACITY: usize = 100;

/// Fixed-capacity ring buffer of timestamped samples.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    /// Total samples accepted since the last reset.
    total_appended: u64,
}

impl SignalBuffer {
    /// Creates a buffer holding at most `capacity` samples.
    ///
    /// Capacities below [`MIN_CAPACITY`] are raised to it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Appends a sample, evicting the oldest when full.
    ///
    /// Non-finite samples are rejected and `false` is returned.
    pub fn append(&mut self, sample: Sample) -> bool {
        if !sample.is_finite() {
            tracing::debug!(?sample, "Rejected non-finite sample");
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_appended += 1;
        true
    }

    /// Returns a snapshot of the last `n` samples, oldest first.
    ///
    /// Returns fewer than `n` samples if the buffer holds fewer.
    pub fn window(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Returns the values of the last `n` samples, oldest first.
    pub fn values(&self, n: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).map(|s| s.value).collect()
    }

    /// Returns the newest sample.
    #[inline]
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Returns the number of buffered samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the maximum number of samples held.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of samples accepted since the last reset.
    #[inline]
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Clears all samples and counters.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.total_appended = 0;
    }
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::new(600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buffer: &mut SignalBuffer, count: usize) {
        for i in 0..count {
            buffer.append(Sample::new(i as f64 * 33.0, i as f64));
        }
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(SignalBuffer::new(10).capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut buffer = SignalBuffer::new(100);
        fill(&mut buffer, 150);

        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.window(100)[0].value, 50.0);
        assert_eq!(buffer.latest().unwrap().value, 149.0);
        assert_eq!(buffer.total_appended(), 150);
    }

    #[test]
    fn test_window_returns_most_recent() {
        let mut buffer = SignalBuffer::new(100);
        fill(&mut buffer, 10);

        let window = buffer.window(3);
        let values: Vec<f64> = window.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
        assert_eq!(buffer.values(3), values);

        assert_eq!(buffer.window(50).len(), 10);
    }

    #[test]
    fn test_snapshot_unaffected_by_append() {
        let mut buffer = SignalBuffer::new(100);
        fill(&mut buffer, 5);

        let snapshot = buffer.window(5);
        buffer.append(Sample::new(1000.0, 99.0));

        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[4].value, 4.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut buffer = SignalBuffer::default();
        assert!(!buffer.append(Sample::new(0.0, f64::NAN)));
        assert!(!buffer.append(Sample::new(f64::INFINITY, 1.0)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reset_then_append() {
        let mut buffer = SignalBuffer::default();
        fill(&mut buffer, 200);

        buffer.reset();
        buffer.append(Sample::new(5.0, 1.5));

        let window = buffer.window(buffer.capacity());
        assert_eq!(window, vec![Sample::new(5.0, 1.5)]);
        assert_eq!(buffer.total_appended(), 1);
    }
}
