//! Pulse marker detection and vitals estimation.
//!
//! ```text
//! detrended samples → ValleyDetector → intervals → VitalsEstimator
//!                                                      ↓
//!                                       HeartRateEstimate, HrvEstimate
//! ```

mod estimator;
mod valley;

pub use estimator::{
    HeartRateEstimate, HrvEstimate, IntervalStats, VitalsComputation, VitalsEstimator,
    MIN_BPM_INTERVALS, MIN_SDNN_INTERVALS,
};
pub use valley::{Direction, Valley, ValleyDetector};
