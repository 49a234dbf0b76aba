//! Metrics collection and registry.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

use crate::session::{ReportSink, VitalsReport};

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Current heart rate, if estimated.
    pub bpm: Option<f64>,
    /// Heart rate confidence (0-100).
    pub bpm_confidence: f64,
    /// Current SDNN in milliseconds, if estimated.
    pub sdnn_ms: Option<f64>,
    /// HRV confidence (0-100).
    pub sdnn_confidence: f64,
    /// Quality class index (0=bad, 1=acceptable, 2=excellent), if classified.
    pub quality_class: Option<usize>,
    /// Quality confidence (0-100).
    pub quality_confidence: f64,
    /// Valleys currently retained.
    pub valleys: usize,
    /// Samples accepted this session.
    pub session_samples: u64,
    /// Frames dropped by the sampler this session.
    pub frames_dropped: u64,
    /// Valley candidates rejected this session.
    pub valleys_rejected: u64,
    /// Intervals excluded as out of band this session.
    pub intervals_excluded: u64,
}

impl MetricsSnapshot {
    /// Creates a snapshot from a session report.
    pub fn from_report(report: &VitalsReport) -> Self {
        Self {
            bpm: report.heart_rate.bpm,
            bpm_confidence: report.heart_rate.confidence,
            sdnn_ms: report.hrv.sdnn_ms,
            sdnn_confidence: report.hrv.confidence,
            quality_class: report.quality.label.map(|l| l.index()),
            quality_confidence: report.quality.confidence,
            valleys: report.valleys.len(),
            session_samples: report.samples_total,
            frames_dropped: report.frames_dropped,
            valleys_rejected: report.valleys_rejected,
            intervals_excluded: report.intervals_excluded,
        }
    }
}

/// Prometheus metrics registry for rPPG sessions.
pub struct MetricsRegistry {
    registry: Registry,

    // Vitals
    heart_rate_bpm: Gauge,
    heart_rate_confidence: Gauge,
    heart_rate_valid: IntGauge,
    hrv_sdnn_ms: Gauge,
    hrv_confidence: Gauge,
    hrv_valid: IntGauge,

    // Quality
    quality_class: IntGauge,
    quality_confidence: Gauge,

    // Pipeline
    valleys: IntGauge,
    session_samples: IntGauge,
    frames_dropped_total: IntCounter,
    // Session drop count at the last update; a smaller value means a reset.
    last_dropped: AtomicU64,
    valleys_rejected: IntGauge,
    intervals_excluded: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let heart_rate_bpm = Gauge::new(
            "rppg_heart_rate_bpm",
            "Estimated heart rate in beats per minute",
        )?;
        let heart_rate_confidence = Gauge::new(
            "rppg_heart_rate_confidence",
            "Heart rate confidence (0-100)",
        )?;
        let heart_rate_valid = IntGauge::new(
            "rppg_heart_rate_valid",
            "Whether a heart rate estimate exists (1=yes, 0=no)",
        )?;
        let hrv_sdnn_ms = Gauge::new(
            "rppg_hrv_sdnn_ms",
            "SDNN of retained intervals in milliseconds",
        )?;
        let hrv_confidence = Gauge::new("rppg_hrv_confidence", "HRV confidence (0-100)")?;
        let hrv_valid = IntGauge::new(
            "rppg_hrv_valid",
            "Whether an HRV estimate exists (1=yes, 0=no)",
        )?;

        let quality_class = IntGauge::new(
            "rppg_quality_class",
            "Signal quality class (-1=unset, 0=bad, 1=acceptable, 2=excellent)",
        )?;
        let quality_confidence = Gauge::new(
            "rppg_quality_confidence",
            "Signal quality confidence (0-100)",
        )?;

        let valleys = IntGauge::new("rppg_valleys", "Valleys currently retained")?;
        let session_samples = IntGauge::new(
            "rppg_session_samples",
            "Samples accepted since the last session reset",
        )?;
        let frames_dropped_total = IntCounter::new(
            "rppg_frames_dropped_total",
            "Frames that could not be reduced to a sample",
        )?;
        let valleys_rejected = IntGauge::new(
            "rppg_valleys_rejected",
            "Valley candidates inside the refractory interval this session",
        )?;
        let intervals_excluded = IntGauge::new(
            "rppg_intervals_excluded",
            "Valley intervals outside the physiological band this session",
        )?;

        registry.register(Box::new(heart_rate_bpm.clone()))?;
        registry.register(Box::new(heart_rate_confidence.clone()))?;
        registry.register(Box::new(heart_rate_valid.clone()))?;
        registry.register(Box::new(hrv_sdnn_ms.clone()))?;
        registry.register(Box::new(hrv_confidence.clone()))?;
        registry.register(Box::new(hrv_valid.clone()))?;
        registry.register(Box::new(quality_class.clone()))?;
        registry.register(Box::new(quality_confidence.clone()))?;
        registry.register(Box::new(valleys.clone()))?;
        registry.register(Box::new(session_samples.clone()))?;
        registry.register(Box::new(frames_dropped_total.clone()))?;
        registry.register(Box::new(valleys_rejected.clone()))?;
        registry.register(Box::new(intervals_excluded.clone()))?;

        quality_class.set(-1);

        Ok(Self {
            registry,
            heart_rate_bpm,
            heart_rate_confidence,
            heart_rate_valid,
            hrv_sdnn_ms,
            hrv_confidence,
            hrv_valid,
            quality_class,
            quality_confidence,
            valleys,
            session_samples,
            frames_dropped_total,
            last_dropped: AtomicU64::new(0),
            valleys_rejected,
            intervals_excluded,
        })
    }

    /// Updates all metrics from a snapshot of session state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Values keep their last reading while unset; the valid flags say which.
        self.heart_rate_valid.set(i64::from(snapshot.bpm.is_some()));
        if let Some(bpm) = snapshot.bpm {
            self.heart_rate_bpm.set(bpm);
        }
        self.heart_rate_confidence.set(snapshot.bpm_confidence);

        self.hrv_valid.set(i64::from(snapshot.sdnn_ms.is_some()));
        if let Some(sdnn) = snapshot.sdnn_ms {
            self.hrv_sdnn_ms.set(sdnn);
        }
        self.hrv_confidence.set(snapshot.sdnn_confidence);

        self.quality_class
            .set(snapshot.quality_class.map_or(-1, |c| c as i64));
        self.quality_confidence.set(snapshot.quality_confidence);

        self.valleys.set(snapshot.valleys as i64);
        self.session_samples.set(snapshot.session_samples as i64);
        self.valleys_rejected.set(snapshot.valleys_rejected as i64);
        self.intervals_excluded.set(snapshot.intervals_excluded as i64);

        // For counters, we need to increment by the difference
        let previous = self
            .last_dropped
            .swap(snapshot.frames_dropped, Ordering::Relaxed);
        let added = if snapshot.frames_dropped >= previous {
            snapshot.frames_dropped - previous
        } else {
            snapshot.frames_dropped
        };
        if added > 0 {
            self.frames_dropped_total.inc_by(added);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ReportSink for MetricsRegistry {
    fn publish(&mut self, report: &VitalsReport) {
        self.update(&MetricsSnapshot::from_report(report));
    }
}
