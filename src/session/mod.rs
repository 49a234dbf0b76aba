//! Recording session.
//!
//! A [`Session`] owns every piece of per-recording state and is driven
//! one frame or sample at a time:
//!
//! ```text
//! on_frame → FrameSampler → on_sample → SignalBuffer
//!                                          ├─ Detrender → ValleyDetector → VitalsEstimator
//!                                          └─ raw window → quality (inline or worker)
//! ```
//!
//! Estimates are pulled through accessors or a [`VitalsReport`]; nothing
//! in here knows about displays or exporters.

mod report;

pub use report::{ReportSink, TracingSink, VitalsReport};

use thiserror::Error;

use crate::capture::Frame;
use crate::config::FileConfig;
use crate::extraction::{FrameSampler, RegionOfInterest};
use crate::quality::{
    FeatureExtractor, InferenceError, QualityClassifier, QualityJob, QualityModel, QualityResult,
    QualityWorker,
};
use crate::signal::{Detrender, Sample, SignalBuffer};
use crate::storage::{StoreError, VitalsRecord};
use crate::vitals::{HeartRateEstimate, HrvEstimate, Valley, ValleyDetector, VitalsEstimator};

/// Session construction errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start quality worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

enum QualityEngine {
    Inline(QualityClassifier),
    Background(QualityWorker),
}

/// Streaming rPPG session.
pub struct Session {
    sampler: FrameSampler,
    buffer: SignalBuffer,
    detrender: Detrender,
    detector: ValleyDetector,
    estimator: VitalsEstimator,
    quality_engine: QualityEngine,
    quality: QualityResult,
    quality_window: usize,
    quality_min_samples: usize,
    quality_interval: u64,
    /// Bumped on every reset; background results from older generations are stale.
    generation: u64,
    stale_discarded: u64,
    quality_failures: u64,
}

impl Session {
    /// Creates a session from a configuration file and an optional model.
    pub fn from_config(
        config: &FileConfig,
        model: Option<Box<dyn QualityModel>>,
    ) -> Result<Self, SessionError> {
        let sampler = FrameSampler::from_name(
            &config.sampler.combination,
            RegionOfInterest::new(config.sampler.roi.clone()),
        );
        Self::new(sampler, config, model)
    }

    /// Creates a session around an existing sampler.
    ///
    /// With `quality.background` set and a model present, inference moves
    /// to a worker thread.
    pub fn new(
        sampler: FrameSampler,
        config: &FileConfig,
        model: Option<Box<dyn QualityModel>>,
    ) -> Result<Self, SessionError> {
        let extractor =
            FeatureExtractor::new(config.quality.sample_rate_hz, config.quality.min_samples);

        let quality_engine = match model {
            Some(model) if config.quality.background => {
                QualityEngine::Background(QualityWorker::spawn(extractor, model)?)
            }
            model => QualityEngine::Inline(QualityClassifier::new(extractor, model)),
        };

        tracing::info!(
            strategy = %sampler.strategy(),
            capacity = config.signal.capacity,
            detrend_span = config.signal.detrend_span,
            max_bpm = config.vitals.max_bpm,
            "Session started"
        );

        Ok(Self {
            sampler,
            buffer: SignalBuffer::new(config.signal.capacity),
            detrender: Detrender::moving_average(config.signal.detrend_span),
            detector: ValleyDetector::new(
                config.vitals.refractory_ms(),
                config.vitals.valley_history,
            ),
            estimator: VitalsEstimator::new(&config.vitals),
            quality_engine,
            quality: QualityResult::default(),
            quality_window: config.quality.window,
            quality_min_samples: config.quality.min_samples,
            quality_interval: config.quality.interval.max(1) as u64,
            generation: 0,
            stale_discarded: 0,
            quality_failures: 0,
        })
    }

    /// Reduces a frame to a sample and feeds it through the pipeline.
    ///
    /// Returns the valley confirmed by this frame, if any.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<Valley> {
        let sample = self.sampler.process(frame)?;
        self.on_sample(sample)
    }

    /// Feeds one sample through the pipeline.
    ///
    /// Returns the valley confirmed by this sample, if any.
    pub fn on_sample(&mut self, sample: Sample) -> Option<Valley> {
        if !self.buffer.append(sample) {
            return None;
        }
        self.poll_quality();

        let valley = self.detect();
        if valley.is_some() {
            let computation = self.estimator.update(&self.detector.intervals_ms());
            tracing::debug!(
                bpm = ?computation.heart_rate.and_then(|hr| hr.bpm),
                sdnn_ms = ?computation.hrv.and_then(|hrv| hrv.sdnn_ms),
                "Valley accepted"
            );
        }

        if self.buffer.total_appended() % self.quality_interval == 0
            && self.buffer.len() >= self.quality_min_samples
        {
            self.assess_quality();
        }
        valley
    }

    /// Feeds the detector the residual of the sample at the centre of the
    /// latest detrend window.
    fn detect(&mut self) -> Option<Valley> {
        let half = self.detrender.half_span();
        let span = 2 * half + 1;
        if self.buffer.len() < span {
            return None;
        }

        let recent = self.buffer.window(span);
        let values: Vec<f64> = recent.iter().map(|s| s.value).collect();
        let centre = recent[half];
        let residual = self.detrender.residual_at(&values, half);
        self.detector.push(Sample::new(centre.timestamp_ms, residual))
    }

    fn assess_quality(&mut self) {
        let window = self.buffer.values(self.quality_window);
        match &mut self.quality_engine {
            QualityEngine::Inline(classifier) => {
                self.quality = classifier.assess(&window);
            }
            QualityEngine::Background(worker) => {
                let job = QualityJob {
                    generation: self.generation,
                    window,
                };
                if !worker.try_submit(job) {
                    tracing::trace!("Quality worker busy, window skipped");
                }
            }
        }
    }

    /// Applies finished background results. Inline sessions have nothing to poll.
    pub fn poll_quality(&mut self) {
        let QualityEngine::Background(worker) = &mut self.quality_engine else {
            return;
        };

        for outcome in worker.poll() {
            if outcome.generation != self.generation {
                self.stale_discarded += 1;
                tracing::debug!(
                    generation = outcome.generation,
                    current = self.generation,
                    "Discarding stale quality result"
                );
                continue;
            }
            match outcome.result {
                Ok(result) => self.quality = result,
                Err(InferenceError::InsufficientData { got, need }) => {
                    tracing::trace!(got, need, "Quality window too short");
                }
                Err(e) => {
                    self.quality_failures += 1;
                    tracing::warn!(error = %e, "Quality inference failed, keeping previous result");
                }
            }
        }
    }

    /// Returns true while a background quality job is running.
    pub fn quality_pending(&self) -> bool {
        match &self.quality_engine {
            QualityEngine::Background(worker) => worker.is_busy(),
            QualityEngine::Inline(_) => false,
        }
    }

    /// Returns the current heart rate estimate.
    #[inline]
    pub fn heart_rate(&self) -> HeartRateEstimate {
        self.estimator.heart_rate()
    }

    /// Returns the current HRV estimate.
    #[inline]
    pub fn hrv(&self) -> HrvEstimate {
        self.estimator.hrv()
    }

    /// Returns the current quality verdict.
    #[inline]
    pub fn quality(&self) -> QualityResult {
        self.quality
    }

    /// Returns the retained valleys, oldest first.
    pub fn valleys(&self) -> Vec<Valley> {
        self.detector.valleys().copied().collect()
    }

    /// Returns a snapshot of the last `n` samples.
    pub fn window(&self, n: usize) -> Vec<Sample> {
        self.buffer.window(n)
    }

    /// Returns the number of buffered samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no samples are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns how many background results were dropped as stale.
    #[inline]
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    /// Builds a report of the current state.
    pub fn report(&self) -> VitalsReport {
        VitalsReport {
            timestamp_ms: self.buffer.latest().map(|s| s.timestamp_ms),
            heart_rate: self.heart_rate(),
            hrv: self.hrv(),
            quality: self.quality,
            raw_window: self.buffer.values(self.buffer.capacity()),
            valleys: self.valleys(),
            samples_total: self.buffer.total_appended(),
            frames_dropped: self.sampler.dropped(),
            valleys_rejected: self.detector.rejected(),
            intervals_excluded: self.estimator.excluded(),
        }
    }

    /// Publishes the current report to a sink.
    pub fn publish(&self, sink: &mut dyn ReportSink) {
        sink.publish(&self.report());
    }

    /// Clears all per-recording state. The sampler and model are kept.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.buffer.reset();
        self.sampler.reset_counters();
        self.detector.reset();
        self.estimator.reset();
        self.quality = QualityResult::default();
        if let QualityEngine::Inline(classifier) = &mut self.quality_engine {
            classifier.reset();
        }
        tracing::info!(generation = self.generation, "Session reset");
    }

    /// Builds the record to persist for `subject_id`.
    pub fn finalize(&self, subject_id: &str) -> Result<VitalsRecord, StoreError> {
        VitalsRecord::new(
            subject_id,
            self.heart_rate(),
            self.hrv(),
            self.buffer.values(self.buffer.capacity()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{QualityFeatures, QualityLabel};
    use std::f64::consts::PI;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    const FS: f64 = 30.0;

    fn sinusoid(i: usize, freq_hz: f64) -> Sample {
        let t = i as f64 / FS;
        Sample::new(t * 1000.0, (2.0 * PI * freq_hz * t).sin())
    }

    fn inline_session(model: Option<Box<dyn QualityModel>>) -> Session {
        let mut config = FileConfig::default();
        config.quality.background = false;
        Session::from_config(&config, model).unwrap()
    }

    fn excellent() -> Box<dyn QualityModel> {
        Box::new(|_: &QualityFeatures| Ok::<_, InferenceError>([0.05, 0.15, 0.8]))
    }

    #[test]
    fn test_sinusoid_heart_rate() {
        let mut session = inline_session(None);
        for i in 0..300 {
            session.on_sample(sinusoid(i, 1.2));
        }

        let bpm = session.heart_rate().bpm.unwrap();
        assert!((bpm - 72.0).abs() < 3.0, "bpm = {bpm}");
        assert!(session.heart_rate().confidence > 90.0);
        assert!(session.hrv().sdnn_ms.unwrap() < 1.0);
    }

    #[test]
    fn test_valleys_respect_refractory() {
        let mut session = inline_session(None);
        for i in 0..300 {
            session.on_sample(sinusoid(i, 1.2));
        }
        let valleys = session.valleys();
        assert!(valleys.len() >= 5);
        for pair in valleys.windows(2) {
            assert!(pair[1].timestamp_ms - pair[0].timestamp_ms >= 250.0);
        }
    }

    #[test]
    fn test_reset_then_one_sample() {
        let mut session = inline_session(Some(excellent()));
        for i in 0..300 {
            session.on_sample(sinusoid(i, 1.2));
        }
        assert!(session.heart_rate().bpm.is_some());

        session.reset();
        session.on_sample(sinusoid(0, 1.2));

        assert_eq!(session.len(), 1);
        assert!(session.valleys().is_empty());
        assert_eq!(session.heart_rate().bpm, None);
        assert_eq!(session.hrv().sdnn_ms, None);
        assert_eq!(session.quality().label, None);
    }

    #[test]
    fn test_reset_clears_dropped_frames() {
        let mut session = inline_session(None);
        for i in 0..4u64 {
            let frame = Frame::solid([90, 90, 90], 40, 30, Duration::from_millis(i * 33), i);
            assert!(session.on_frame(&frame).is_none());
        }
        assert_eq!(session.report().frames_dropped, 4);

        session.reset();
        assert_eq!(session.report().frames_dropped, 0);
    }

    #[test]
    fn test_inline_quality_after_min_samples() {
        let mut session = inline_session(Some(excellent()));
        for i in 0..99 {
            session.on_sample(sinusoid(i, 1.2));
        }
        assert_eq!(session.quality().label, None);

        for i in 99..120 {
            session.on_sample(sinusoid(i, 1.2));
        }
        let quality = session.quality();
        assert_eq!(quality.label, Some(QualityLabel::Excellent));
        assert!((quality.confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_sample_ignored() {
        let mut session = inline_session(None);
        session.on_sample(Sample::new(0.0, f64::NAN));
        assert!(session.is_empty());
    }

    #[test]
    fn test_background_quality_applied() {
        let mut session = Session::from_config(&FileConfig::default(), Some(excellent())).unwrap();
        for i in 0..105 {
            session.on_sample(sinusoid(i, 1.2));
        }

        for _ in 0..500 {
            session.poll_quality();
            if session.quality().label.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(session.quality().label, Some(QualityLabel::Excellent));
    }

    #[test]
    fn test_stale_background_result_discarded() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        let model = move |_: &QualityFeatures| {
            worker_gate.wait();
            Ok::<_, InferenceError>([0.0, 0.0, 1.0])
        };
        let mut session =
            Session::from_config(&FileConfig::default(), Some(Box::new(model))).unwrap();

        // Sample 105 is the first quality tick with a full minimum window.
        for i in 0..105 {
            session.on_sample(sinusoid(i, 1.2));
        }
        assert!(session.quality_pending());

        session.reset();
        gate.wait();

        for _ in 0..500 {
            session.poll_quality();
            if !session.quality_pending() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(session.stale_discarded(), 1);
        assert_eq!(session.quality().label, None);
    }

    #[test]
    fn test_report_and_finalize() {
        let mut session = inline_session(None);
        for i in 0..300 {
            session.on_sample(sinusoid(i, 1.2));
        }

        let report = session.report();
        assert_eq!(report.raw_window.len(), 300);
        assert_eq!(report.valleys.len(), session.valleys().len());
        assert_eq!(report.samples_total, 300);

        let record = session.finalize("subject-1").unwrap();
        assert_eq!(record.subject_id, "subject-1");
        assert_eq!(record.heart_rate.bpm, session.heart_rate().bpm);
        assert!(session.finalize("").is_err());
    }

    #[test]
    fn test_closure_sink_receives_report() {
        let mut session = inline_session(None);
        session.on_sample(sinusoid(0, 1.2));

        let mut seen = Vec::new();
        let mut sink = |report: &VitalsReport| seen.push(report.samples_total);
        session.publish(&mut sink);
        assert_eq!(seen, vec![1]);
    }
}
