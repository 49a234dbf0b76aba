//! Heart rate and HRV estimation from valley intervals.
//!
//! Only intervals inside the physiological band are used; anything else
//! is a missed or spurious beat and is skipped without being counted.
//! Confidence falls linearly with the coefficient of variation of the
//! retained intervals.

use serde::{Deserialize, Serialize};

use crate::config::VitalsConfig;

/// Heart rate estimate. `bpm` is unset until two intervals are retained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeartRateEstimate {
    pub bpm: Option<f64>,
    /// 0-100.
    pub confidence: f64,
}

/// HRV estimate. `sdnn_ms` is unset until three intervals are retained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HrvEstimate {
    pub sdnn_ms: Option<f64>,
    /// 0-100.
    pub confidence: f64,
}

/// Summary statistics of the retained intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    pub count: usize,
    pub mean_ms: f64,
    /// Population standard deviation.
    pub std_ms: f64,
    /// Coefficient of variation (`std / mean`).
    pub cv: f64,
    /// Mean of the per-interval instantaneous heart rates.
    pub mean_bpm: f64,
}

impl IntervalStats {
    /// Computes statistics over intervals, or `None` for an empty slice.
    pub fn from_intervals(intervals_ms: &[f64]) -> Option<Self> {
        if intervals_ms.is_empty() {
            return None;
        }
        let n = intervals_ms.len() as f64;
        let mean_ms = intervals_ms.iter().sum::<f64>() / n;
        let variance = intervals_ms.iter().map(|v| (v - mean_ms).powi(2)).sum::<f64>() / n;
        let std_ms = variance.sqrt();
        let mean_bpm = intervals_ms.iter().map(|v| 60_000.0 / v).sum::<f64>() / n;
        let cv = if mean_ms > 0.0 { std_ms / mean_ms } else { 0.0 };

        Some(Self {
            count: intervals_ms.len(),
            mean_ms,
            std_ms,
            cv,
            mean_bpm,
        })
    }
}

/// Result of one estimation pass; `None` fields lacked data.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VitalsComputation {
    pub heart_rate: Option<HeartRateEstimate>,
    pub hrv: Option<HrvEstimate>,
}

/// Minimum retained intervals for a heart rate estimate.
pub const MIN_BPM_INTERVALS: usize = 2;
/// Minimum retained intervals for an SDNN estimate.
pub const MIN_SDNN_INTERVALS: usize = 3;

/// Turns valley intervals into heart rate and HRV estimates.
///
/// The last successful estimate is kept until a newer computation has
/// enough data to replace it, or until [`VitalsEstimator::reset`].
#[derive(Debug, Clone)]
pub struct VitalsEstimator {
    min_interval_ms: f64,
    max_interval_ms: f64,
    interval_count: usize,
    cv_threshold: f64,
    heart_rate: HeartRateEstimate,
    hrv: HrvEstimate,
    excluded: u64,
}

impl VitalsEstimator {
    pub fn new(config: &VitalsConfig) -> Self {
        let (min_interval_ms, max_interval_ms) = config.interval_band_ms();
        Self {
            min_interval_ms,
            max_interval_ms,
            interval_count: config.interval_count.max(MIN_SDNN_INTERVALS),
            cv_threshold: config.cv_threshold.max(f64::EPSILON),
            heart_rate: HeartRateEstimate::default(),
            hrv: HrvEstimate::default(),
            excluded: 0,
        }
    }

    /// Selects the most recent in-band intervals, oldest first.
    ///
    /// Out-of-band intervals are skipped and do not count toward the limit.
    pub fn retained(&self, intervals_ms: &[f64]) -> Vec<f64> {
        let mut kept: Vec<f64> = intervals_ms
            .iter()
            .rev()
            .copied()
            .filter(|v| v.is_finite() && (self.min_interval_ms..=self.max_interval_ms).contains(v))
            .take(self.interval_count)
            .collect();
        kept.reverse();
        kept
    }

    /// Maps a coefficient of variation to a 0-100 confidence.
    pub fn confidence_for(&self, cv: f64) -> f64 {
        (100.0 * (1.0 - cv / self.cv_threshold)).clamp(0.0, 100.0)
    }

    /// Computes estimates without touching the stored state.
    pub fn compute(&self, intervals_ms: &[f64]) -> VitalsComputation {
        let kept = self.retained(intervals_ms);
        let Some(stats) = IntervalStats::from_intervals(&kept) else {
            return VitalsComputation::default();
        };
        let confidence = self.confidence_for(stats.cv);

        let heart_rate = (stats.count >= MIN_BPM_INTERVALS).then_some(HeartRateEstimate {
            bpm: Some(stats.mean_bpm),
            confidence,
        });
        let hrv = (stats.count >= MIN_SDNN_INTERVALS).then_some(HrvEstimate {
            sdnn_ms: Some(stats.std_ms),
            confidence,
        });

        VitalsComputation { heart_rate, hrv }
    }

    /// Recomputes from the current intervals and stores the new estimates.
    pub fn update(&mut self, intervals_ms: &[f64]) -> VitalsComputation {
        let result = self.compute(intervals_ms);
        if let Some(&newest) = intervals_ms.last() {
            if !self.in_band(newest) {
                self.excluded += 1;
                tracing::debug!(interval_ms = newest, "Interval outside physiological band");
            }
        }

        if let Some(heart_rate) = result.heart_rate {
            self.heart_rate = heart_rate;
        }
        if let Some(hrv) = result.hrv {
            self.hrv = hrv;
        }
        result
    }

    fn in_band(&self, interval_ms: f64) -> bool {
        (self.min_interval_ms..=self.max_interval_ms).contains(&interval_ms)
    }

    /// Returns the current heart rate estimate.
    #[inline]
    pub fn heart_rate(&self) -> HeartRateEstimate {
        self.heart_rate
    }

    /// Returns the current HRV estimate.
    #[inline]
    pub fn hrv(&self) -> HrvEstimate {
        self.hrv
    }

    /// Returns how many newest intervals were outside the band when seen.
    #[inline]
    pub fn excluded(&self) -> u64 {
        self.excluded
    }

    /// Clears estimates back to unset.
    pub fn reset(&mut self) {
        self.heart_rate = HeartRateEstimate::default();
        self.hrv = HrvEstimate::default();
        self.excluded = 0;
    }
}

impl Default for VitalsEstimator {
    fn default() -> Self {
        Self::new(&VitalsConfig::default())
    }
}
