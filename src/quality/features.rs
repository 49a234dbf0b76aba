//! Signal quality features.
//!
//! Twelve statistics describe a raw sample window: moments, range,
//! zero crossings and the dominant spectral component. The order is part
//! of the contract with the pre-trained classifier; peak-to-peak appears
//! twice because the classifier was trained on exactly this layout.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Number of features in a [`QualityFeatures`] vector.
pub const FEATURE_COUNT: usize = 12;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean",
    "std",
    "skewness",
    "kurtosis",
    "peak_to_peak",
    "zero_crossings",
    "rms",
    "peak_to_peak_repeat",
    "median",
    "variance",
    "dominant_frequency_hz",
    "dominant_power",
];

/// Fixed-order feature vector fed to the quality classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityFeatures([f64; FEATURE_COUNT]);

impl QualityFeatures {
    /// The neutral vector returned for empty or short windows.
    pub const fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    /// Wraps raw values; non-finite entries are replaced with zero.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values.map(|v| if v.is_finite() { v } else { 0.0 }))
    }

    /// Returns the values as an array.
    #[inline]
    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Returns the values as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Always [`FEATURE_COUNT`].
    #[inline]
    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    /// Never empty; present for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if every feature is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    #[inline]
    pub fn dominant_frequency_hz(&self) -> f64 {
        self.0[10]
    }

    #[inline]
    pub fn dominant_power(&self) -> f64 {
        self.0[11]
    }
}

impl Default for QualityFeatures {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Computes [`QualityFeatures`] from raw sample windows.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    /// Assumed sample rate for frequency features.
    sample_rate_hz: f64,
    /// Windows shorter than this yield the zero vector.
    min_samples: usize,
}

impl FeatureExtractor {
    pub fn new(sample_rate_hz: f64, min_samples: usize) -> Self {
        Self {
            sample_rate_hz,
            min_samples: min_samples.max(1),
        }
    }

    /// Returns the minimum window length.
    #[inline]
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Returns the assumed sample rate.
    #[inline]
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Extracts features from a raw window.
    ///
    /// Non-finite values are ignored. Windows with fewer than
    /// `min_samples` usable values return [`QualityFeatures::zeros`].
    pub fn extract(&self, window: &[f64]) -> QualityFeatures {
        let signal: Vec<f64> = window.iter().copied().filter(|v| v.is_finite()).collect();
        if signal.is_empty() || signal.len() < self.min_samples {
            return QualityFeatures::zeros();
        }

        let n = signal.len() as f64;
        let mean = signal.iter().sum::<f64>() / n;
        let variance = signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        let (skewness, kurtosis) = if std > 0.0 {
            let m3 = signal.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
            let m4 = signal.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
            (m3 / std.powi(3), m4 / std.powi(4))
        } else {
            (0.0, 0.0)
        };

        let max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = signal.iter().copied().fold(f64::INFINITY, f64::min);
        let peak_to_peak = max - min;

        let zero_crossings = signal
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count() as f64;

        let rms = (signal.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        let median = median(&signal);
        let (dominant_frequency, dominant_power) = dominant_component(&signal, self.sample_rate_hz);

        QualityFeatures::from_array([
            mean,
            std,
            skewness,
            kurtosis,
            peak_to_peak,
            zero_crossings,
            rms,
            peak_to_peak,
            median,
            variance,
            dominant_frequency,
            dominant_power,
        ])
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(30.0, 100)
    }
}

fn median(signal: &[f64]) -> f64 {
    let mut sorted = signal.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// DFT magnitude spectrum for bins `1..n/2` (DC and Nyquist excluded).
///
/// Returns `(frequency_hz, magnitude)` per bin. Direct O(n²) evaluation
/// against a shared twiddle table.
pub fn magnitude_spectrum(signal: &[f64], sample_rate_hz: f64) -> Vec<(f64, f64)> {
    let n = signal.len();
    let half = n / 2;
    if half < 2 {
        return Vec::new();
    }

    let twiddles: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let angle = -2.0 * PI * i as f64 / n as f64;
            (angle.cos(), angle.sin())
        })
        .collect();

    (1..half)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for (t, &x) in signal.iter().enumerate() {
                let (c, s) = twiddles[(k * t) % n];
                re += x * c;
                im += x * s;
            }
            let frequency = k as f64 * sample_rate_hz / n as f64;
            (frequency, (re * re + im * im).sqrt())
        })
        .collect()
}

/// Frequency and magnitude of the strongest non-DC bin.
///
/// Ties keep the lowest frequency. A flat spectrum yields `(0, 0)`.
fn dominant_component(signal: &[f64], sample_rate_hz: f64) -> (f64, f64) {
    let mut best = (0.0, 0.0);
    for (frequency, magnitude) in magnitude_spectrum(signal, sample_rate_hz) {
        if magnitude > best.1 {
            best = (frequency, magnitude);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid(freq_hz: f64, fs: f64, n: usize, offset: f64) -> Vec<f64> {
        (0..n)
            .map(|i| offset + (2.0 * PI * freq_hz * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_short_window_is_neutral() {
        let extractor = FeatureExtractor::default();
        assert!(extractor.extract(&[]).is_zero());
        assert!(extractor.extract(&vec![1.0; 99]).is_zero());
    }

    #[test]
    fn test_all_zero_signal_all_zero_features() {
        let features = FeatureExtractor::default().extract(&vec![0.0; 300]);
        assert_eq!(features.len(), FEATURE_COUNT);
        assert!(features.is_zero());
    }

    #[test]
    fn test_constant_signal_moments() {
        let features = FeatureExtractor::default().extract(&vec![5.0; 120]);
        let f = features.as_array();

        assert_eq!(f[0], 5.0);
        assert_eq!(f[1], 0.0);
        assert_eq!(f[2], 0.0);
        assert_eq!(f[3], 0.0);
        assert_eq!(f[5], 0.0);
        assert_eq!(f[8], 5.0);
        assert!(f[11] < 1e-9);
    }

    #[test]
    fn test_sinusoid_features() {
        // 1.2 Hz at 30 Hz for 10 s: bin 12 of 300 is exact.
        let signal = sinusoid(1.2, 30.0, 300, 0.0);
        let features = FeatureExtractor::default().extract(&signal);
        let f = features.as_array();

        assert!(f[0].abs() < 1e-9);
        assert!((f[1] - (0.5f64).sqrt()).abs() < 1e-6);
        assert!(f[2].abs() < 1e-6);
        assert!((f[3] - 1.5).abs() < 1e-6);
        assert!((f[4] - f[7]).abs() < 1e-12);
        assert!((f[6] - f[1]).abs() < 1e-6);
        assert!((f[9] - 0.5).abs() < 1e-6);
        assert!((features.dominant_frequency_hz() - 1.2).abs() < 1e-9);
        assert!((features.dominant_power() - 150.0).abs() < 1e-6);
        // Two sign changes per cycle; the last upward crossing would fall on sample 300.
        assert_eq!(f[5], 23.0);
    }

    #[test]
    fn test_dc_offset_ignored_by_spectrum() {
        let signal = sinusoid(2.0, 30.0, 150, 100.0);
        let features = FeatureExtractor::default().extract(&signal);
        assert!((features.dominant_frequency_hz() - 2.0).abs() < 1e-9);
        assert_eq!(features.as_array()[5], 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let mut signal = vec![1.0; 100];
        signal.push(f64::NAN);
        let features = FeatureExtractor::default().extract(&signal);
        assert_eq!(features.as_array()[0], 1.0);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }
}
