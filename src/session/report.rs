//! Per-tick session reports and the sinks that consume them.

use serde::{Deserialize, Serialize};

use crate::quality::QualityResult;
use crate::vitals::{HeartRateEstimate, HrvEstimate, Valley};

/// Snapshot of everything a display or exporter needs for one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VitalsReport {
    /// Timestamp of the newest sample, if any.
    pub timestamp_ms: Option<f64>,
    pub heart_rate: HeartRateEstimate,
    pub hrv: HrvEstimate,
    pub quality: QualityResult,
    /// Raw sample values, oldest first.
    pub raw_window: Vec<f64>,
    /// Retained valley marks, oldest first.
    pub valleys: Vec<Valley>,
    pub samples_total: u64,
    pub frames_dropped: u64,
    pub valleys_rejected: u64,
    pub intervals_excluded: u64,
}

/// Receives session reports.
pub trait ReportSink {
    /// Consumes one report.
    fn publish(&mut self, report: &VitalsReport);
}

impl<F> ReportSink for F
where
    F: FnMut(&VitalsReport),
{
    fn publish(&mut self, report: &VitalsReport) {
        self(report)
    }
}

/// Sink that writes a structured log line per report.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn publish(&mut self, report: &VitalsReport) {
        tracing::info!(
            bpm = ?report.heart_rate.bpm,
            bpm_confidence = report.heart_rate.confidence,
            sdnn_ms = ?report.hrv.sdnn_ms,
            sdnn_confidence = report.hrv.confidence,
            quality = ?report.quality.label,
            quality_confidence = report.quality.confidence,
            valleys = report.valleys.len(),
            "Vitals"
        );
    }
}
