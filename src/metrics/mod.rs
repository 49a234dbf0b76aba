//! Prometheus metrics exporter for vitals monitoring.
//!
//! This module exposes the live session estimates in Prometheus format.
//! [`MetricsRegistry`] is a [`ReportSink`](crate::session::ReportSink);
//! with the `metrics` feature, [`MetricsServer`] serves it over HTTP.
//!
//! # Metrics Exposed
//!
//! ## Vitals
//! - `rppg_heart_rate_bpm` - Estimated heart rate
//! - `rppg_heart_rate_confidence` - Heart rate confidence (0-100)
//! - `rppg_heart_rate_valid` - 1 once a heart rate estimate exists
//! - `rppg_hrv_sdnn_ms` - SDNN of the retained intervals
//! - `rppg_hrv_confidence` - HRV confidence (0-100)
//! - `rppg_hrv_valid` - 1 once an HRV estimate exists
//!
//! ## Quality
//! - `rppg_quality_class` - -1 unset, 0 bad, 1 acceptable, 2 excellent
//! - `rppg_quality_confidence` - Quality confidence (0-100)
//!
//! ## Pipeline
//! - `rppg_valleys` - Valleys currently retained
//! - `rppg_session_samples` - Samples since the last reset
//! - `rppg_frames_dropped_total` - Frames that produced no sample
//! - `rppg_valleys_rejected` - Refractory rejections this session
//! - `rppg_intervals_excluded` - Out-of-band intervals this session
//!
//! # Example
//!
//! ```no_run
//! use rppg_vitals::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     bpm: Some(72.0),
//!     bpm_confidence: 93.0,
//!     sdnn_ms: Some(41.0),
//!     sdnn_confidence: 93.0,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
