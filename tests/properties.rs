//! Property tests for the signal and vitals invariants.

use proptest::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

use rppg_vitals::config::VitalsConfig;
use rppg_vitals::quality::{FeatureExtractor, QualityResult, FEATURE_COUNT};
use rppg_vitals::signal::{Detrender, Sample, SignalBuffer};
use rppg_vitals::vitals::{ValleyDetector, VitalsEstimator};

proptest! {
    #[test]
    fn test_valleys_never_closer_than_refractory(
        values in prop::collection::vec(-10.0f64..10.0, 0..400),
        steps in prop::collection::vec(1.0f64..80.0, 400),
        max_bpm in 120.0f64..300.0,
    ) {
        let mut detector = ValleyDetector::for_max_bpm(max_bpm, 20);
        let refractory = detector.refractory_ms();
        let mut t = 0.0;
        for (value, step) in values.iter().zip(&steps) {
            t += step;
            detector.push(Sample::new(t, *value));
        }

        let valleys: Vec<_> = detector.valleys().copied().collect();
        prop_assert!(valleys.len() <= 20);
        for pair in valleys.windows(2) {
            prop_assert!(pair[1].timestamp_ms - pair[0].timestamp_ms >= refractory);
        }
    }

    #[test]
    fn test_short_windows_are_neutral(values in prop::collection::vec(-1e3f64..1e3, 0..100)) {
        let features = FeatureExtractor::default().extract(&values);
        prop_assert_eq!(features.len(), FEATURE_COUNT);
        prop_assert!(features.is_zero());
    }

    #[test]
    fn test_features_always_finite(values in prop::collection::vec(-1e3f64..1e3, 100..300)) {
        let features = FeatureExtractor::default().extract(&values);
        prop_assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_confidence_monotone_in_cv(a in 0.0f64..2.0, b in 0.0f64..2.0) {
        let estimator = VitalsEstimator::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let (c_low, c_high) = (estimator.confidence_for(low), estimator.confidence_for(high));
        prop_assert!(c_low >= c_high);
        prop_assert!((0.0..=100.0).contains(&c_low));
    }

    #[test]
    fn test_sdnn_bounded_by_jitter(seed in any::<u64>(), amplitude in 1.0f64..100.0) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let intervals: Vec<f64> = (0..12)
            .map(|_| {
                let unit = rng.next_u32() as f64 / u32::MAX as f64 * 2.0 - 1.0;
                800.0 + amplitude * unit
            })
            .collect();

        let estimator = VitalsEstimator::new(&VitalsConfig::default());
        let hrv = estimator.compute(&intervals).hrv.unwrap();
        let sdnn = hrv.sdnn_ms.unwrap();
        prop_assert!(sdnn > 0.0);
        prop_assert!(sdnn <= amplitude);
    }

    #[test]
    fn test_buffer_bounded(capacity in 0usize..800, count in 0usize..1500) {
        let mut buffer = SignalBuffer::new(capacity);
        for i in 0..count {
            buffer.append(Sample::new(i as f64, i as f64));
        }
        prop_assert!(buffer.len() <= buffer.capacity());
        prop_assert!(buffer.capacity() >= 100);
        prop_assert_eq!(buffer.len(), count.min(buffer.capacity()));
        prop_assert_eq!(buffer.window(50).len(), count.min(50));
    }

    #[test]
    fn test_detrended_output_zero_mean(values in prop::collection::vec(-1e3f64..1e3, 1..200)) {
        let out = Detrender::default().apply(&values);
        prop_assert_eq!(out.len(), values.len());
        let mean = out.iter().sum::<f64>() / out.len() as f64;
        prop_assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn test_quality_confidence_in_range(p in prop::array::uniform3(-1.0f64..2.0)) {
        let result = QualityResult::from_probabilities(&p).unwrap();
        prop_assert!((0.0..=100.0).contains(&result.confidence));
        prop_assert!(result.label.is_some());
    }
}

#[test]
fn test_periodic_valleys_have_zero_sdnn() {
    let estimator = VitalsEstimator::default();
    let hrv = estimator.compute(&[857.0; 10]).hrv.unwrap();
    assert_eq!(hrv.sdnn_ms, Some(0.0));
}
