//! Sample storage and conditioning.
//!
//! Samples flow from the frame sampler into a [`SignalBuffer`]; the
//! vitals and quality paths both read snapshots of it. The
//! [`Detrender`] strips baseline drift before valley detection.

mod buffer;
mod detrend;

pub use buffer::{SignalBuffer, MIN_CAPACITY};
pub use detrend::Detrender;

use serde::{Deserialize, Serialize};

/// One scalar pulse sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in milliseconds since stream start.
    pub timestamp_ms: f64,
    /// Combined channel value.
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: f64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }

    /// Returns true if both fields are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.timestamp_ms.is_finite() && self.value.is_finite()
    }
}
