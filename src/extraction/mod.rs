//! Frame-to-sample reduction.
//!
//! This module reduces each RGB frame to one scalar pulse sample: the ROI
//! is located, its channels averaged, and the averages projected by the
//! session's [`CombinationStrategy`]. Frames that cannot be reduced are
//! dropped without interrupting the stream.

mod roi;
mod strategy;

pub use roi::{is_skin, ChannelMeans, RegionOfInterest, RoiConfig};
pub use strategy::CombinationStrategy;

use crate::capture::Frame;
use crate::signal::Sample;

/// Reduces frames to pulse samples.
///
/// The strategy is fixed at construction and stays the same for the
/// whole session.
pub struct FrameSampler {
    strategy: CombinationStrategy,
    roi: RegionOfInterest,
    sampled: u64,
    dropped: u64,
}

impl FrameSampler {
    pub fn new(strategy: CombinationStrategy, roi: RegionOfInterest) -> Self {
        Self {
            strategy,
            roi,
            sampled: 0,
            dropped: 0,
        }
    }

    /// Creates a sampler from a strategy name; unknown names use the default.
    pub fn from_name(name: &str, roi: RegionOfInterest) -> Self {
        Self::new(CombinationStrategy::from_name(name), roi)
    }

    /// Processes a frame and returns its sample, if one can be produced.
    ///
    /// Returns `None` for malformed frames and frames where the ROI
    /// cannot be located.
    pub fn process(&mut self, frame: &Frame) -> Option<Sample> {
        if !frame.is_valid() {
            self.dropped += 1;
            tracing::debug!(sequence = frame.sequence(), "Dropping malformed frame");
            return None;
        }

        let Some(means) = self.roi.measure(frame) else {
            self.dropped += 1;
            tracing::debug!(sequence = frame.sequence(), "ROI not located, frame dropped");
            return None;
        };

        let value = self.strategy.combine(&means);
        if !value.is_finite() {
            self.dropped += 1;
            return None;
        }

        self.sampled += 1;
        Some(Sample::new(frame.timestamp_ms(), value))
    }

    /// Returns the active strategy.
    #[inline]
    pub fn strategy(&self) -> CombinationStrategy {
        self.strategy
    }

    /// Returns the number of frames reduced to samples.
    #[inline]
    pub fn sampled(&self) -> u64 {
        self.sampled
    }

    /// Returns the number of frames dropped.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Zeroes the sampled and dropped counters.
    pub fn reset_counters(&mut self) {
        self.sampled = 0;
        self.dropped = 0;
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(CombinationStrategy::default(), RegionOfInterest::default())
    }
}
