//! rPPG Vitals Library
//!
//! Remote photoplethysmography: heart rate, heart rate variability and
//! signal quality estimated from the color changes a pulse leaves in
//! camera frames of exposed skin.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → extraction → signal → vitals
//!                          ↓
//!                       quality
//! ```
//!
//! A [`Session`] wires the stages together and owns all per-recording
//! state. Finished recordings go to a [`storage::RecordStore`]; live
//! estimates can be exported through [`metrics`].
//!
//! # Design Principles
//!
//! - **Unset, not wrong**: estimates stay unset until enough data exists
//! - **Never block the sample path**: quality inference can run on a worker
//! - **Pluggable seams**: frame source, quality model and report sinks are traits
//!
//! # Example
//!
//! ```no_run
//! use rppg_vitals::{
//!     capture::{Camera, CaptureConfig, MockCamera},
//!     config::FileConfig,
//!     session::Session,
//! };
//!
//! let config = FileConfig::default();
//! let mut camera = MockCamera::with_pulse(72.0);
//! camera.open(&CaptureConfig::default()).unwrap();
//!
//! let mut session = Session::from_config(&config, None).unwrap();
//!
//! for _ in 0..300 {
//!     if let Ok(frame) = camera.capture() {
//!         session.on_frame(&frame);
//!     }
//! }
//!
//! if let Some(bpm) = session.heart_rate().bpm {
//!     println!("{bpm:.1} bpm");
//! }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod extraction;
pub mod metrics;
pub mod quality;
pub mod session;
pub mod signal;
pub mod storage;
pub mod vitals;

// Re-export commonly used types at crate root
pub use capture::{Camera, CaptureConfig, Frame, MockCamera};
pub use config::{ConfigError, FileConfig};
pub use extraction::{CombinationStrategy, FrameSampler};
pub use quality::{DenseModel, QualityLabel, QualityModel, QualityResult};
pub use session::{ReportSink, Session, VitalsReport};
pub use signal::{Sample, SignalBuffer};
pub use storage::{JsonLinesStore, MemoryStore, RecordStore, VitalsRecord};
pub use vitals::{HeartRateEstimate, HrvEstimate, Valley};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
