//! Streaming valley detection.
//!
//! Each valley marks the onset of one heartbeat. The detector tracks
//! whether the detrended waveform is falling or rising; the turn from
//! falling to rising puts a candidate on the sample before the turn.
//! Candidates closer than the refractory interval to the previous
//! accepted valley are noise and are discarded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::signal::Sample;

/// A detected local minimum of the detrended waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valley {
    /// Time of the minimum in milliseconds since stream start.
    pub timestamp_ms: f64,
    /// Detrended value at the minimum.
    pub value: f64,
}

/// Direction of the waveform between the last two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descending,
    Ascending,
}

/// Refractory-gated valley detector over a stream of detrended samples.
#[derive(Debug, Clone)]
pub struct ValleyDetector {
    refractory_ms: f64,
    history_len: usize,
    /// Starts ascending so nothing is reported before a real descent.
    state: Direction,
    previous: Option<Sample>,
    valleys: VecDeque<Valley>,
    rejected: u64,
}

impl ValleyDetector {
    /// Creates a detector.
    ///
    /// `refractory_ms` is the minimum spacing between accepted valleys,
    /// `history_len` the number of valleys retained.
    pub fn new(refractory_ms: f64, history_len: usize) -> Self {
        let history_len = history_len.max(2);
        Self {
            refractory_ms: refractory_ms.max(0.0),
            history_len,
            state: Direction::Ascending,
            previous: None,
            valleys: VecDeque::with_capacity(history_len),
            rejected: 0,
        }
    }

    /// Creates a detector whose refractory interval matches `max_bpm`.
    pub fn for_max_bpm(max_bpm: f64, history_len: usize) -> Self {
        Self::new(60_000.0 / max_bpm, history_len)
    }

    /// Feeds one detrended sample. Returns the valley it confirmed, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Valley> {
        if !sample.is_finite() {
            return None;
        }
        let prev = self.previous.replace(sample)?;

        if sample.value < prev.value {
            self.state = Direction::Descending;
            return None;
        }
        if sample.value == prev.value || self.state == Direction::Ascending {
            return None;
        }

        self.state = Direction::Ascending;
        let candidate = Valley {
            timestamp_ms: prev.timestamp_ms,
            value: prev.value,
        };
        self.accept(candidate)
    }

    fn accept(&mut self, candidate: Valley) -> Option<Valley> {
        if let Some(last) = self.valleys.back() {
            let elapsed = candidate.timestamp_ms - last.timestamp_ms;
            if elapsed < self.refractory_ms || elapsed <= 0.0 {
                self.rejected += 1;
                tracing::trace!(elapsed, "Valley candidate inside refractory interval");
                return None;
            }
        }

        if self.valleys.len() == self.history_len {
            self.valleys.pop_front();
        }
        self.valleys.push_back(candidate);
        tracing::trace!(timestamp_ms = candidate.timestamp_ms, "Valley accepted");
        Some(candidate)
    }

    /// Returns the retained valleys, oldest first.
    pub fn valleys(&self) -> impl ExactSizeIterator<Item = &Valley> + '_ {
        self.valleys.iter()
    }

    /// Returns the most recent valley.
    #[inline]
    pub fn last_valley(&self) -> Option<&Valley> {
        self.valleys.back()
    }

    /// Returns the intervals between consecutive retained valleys in ms.
    pub fn intervals_ms(&self) -> Vec<f64> {
        self.valleys
            .iter()
            .zip(self.valleys.iter().skip(1))
            .map(|(a, b)| b.timestamp_ms - a.timestamp_ms)
            .collect()
    }

    /// Returns the current direction.
    #[inline]
    pub fn state(&self) -> Direction {
        self.state
    }

    /// Returns the refractory interval in milliseconds.
    #[inline]
    pub fn refractory_ms(&self) -> f64 {
        self.refractory_ms
    }

    /// Returns how many candidates fell inside the refractory interval.
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.state = Direction::Ascending;
        self.previous = None;
        self.valleys.clear();
        self.rejected = 0;
    }
}

impl Default for ValleyDetector {
    fn default() -> Self {
        Self::for_max_bpm(240.0, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut ValleyDetector, values: &[f64], step_ms: f64) -> Vec<Valley> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| detector.push(Sample::new(i as f64 * step_ms, v)))
            .collect()
    }

    #[test]
    fn test_single_valley_at_prior_sample() {
        let mut detector = ValleyDetector::default();
        let valleys = feed(&mut detector, &[3.0, 2.0, 1.0, 2.0, 3.0], 100.0);

        assert_eq!(valleys.len(), 1);
        assert_eq!(valleys[0].timestamp_ms, 200.0);
        assert_eq!(valleys[0].value, 1.0);
        assert_eq!(detector.state(), Direction::Ascending);
    }

    #[test]
    fn test_no_valley_before_descent() {
        let mut detector = ValleyDetector::default();
        let valleys = feed(&mut detector, &[1.0, 2.0, 3.0, 4.0], 100.0);
        assert!(valleys.is_empty());
    }

    #[test]
    fn test_flat_run_continues_descent() {
        let mut detector = ValleyDetector::default();
        let valleys = feed(&mut detector, &[3.0, 1.0, 1.0, 1.0, 2.0], 100.0);

        assert_eq!(valleys.len(), 1);
        // Candidate is the last sample of the flat run.
        assert_eq!(valleys[0].timestamp_ms, 300.0);
    }

    #[test]
    fn test_flat_run_continues_ascent() {
        let mut detector = ValleyDetector::default();
        let valleys = feed(&mut detector, &[3.0, 1.0, 2.0, 2.0, 3.0], 100.0);
        assert_eq!(valleys.len(), 1);
    }

    #[test]
    fn test_refractory_rejects_close_candidates() {
        let mut detector = ValleyDetector::new(250.0, 20);
        // Minima at 100ms and 300ms: second one is 200ms later.
        let valleys = feed(&mut detector, &[2.0, 0.0, 1.0, 0.0, 1.0, 2.0], 100.0);

        assert_eq!(valleys.len(), 1);
        assert_eq!(detector.rejected(), 1);
    }

    #[test]
    fn test_history_bounded() {
        let mut detector = ValleyDetector::new(250.0, 3);
        let pattern: Vec<f64> = (0..40)
            .map(|i| if i % 4 == 0 { 0.0 } else { 1.0 + (i % 4) as f64 })
            .collect();
        feed(&mut detector, &pattern, 100.0);

        assert_eq!(detector.valleys().len(), 3);
        assert_eq!(detector.intervals_ms(), vec![400.0, 400.0]);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = ValleyDetector::default();
        feed(&mut detector, &[3.0, 1.0, 3.0], 100.0);
        assert!(detector.last_valley().is_some());

        detector.reset();
        assert!(detector.last_valley().is_none());
        assert!(detector.intervals_ms().is_empty());
    }
}
