//! Configuration file format and validation.
//!
//! Every tunable of the pipeline lives in one TOML file with one section
//! per stage. Missing sections and keys fall back to defaults tuned for a
//! 30 fps webcam.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::CaptureConfig;
use crate::extraction::RoiConfig;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid heart rate band: {min_bpm}-{max_bpm} bpm")]
    InvalidHeartRateBand { min_bpm: f64, max_bpm: f64 },
    #[error("invalid region of interest: {0}")]
    InvalidRoi(String),
    #[error("detrend span {0} is too short (minimum 3 samples)")]
    DetrendSpanTooShort(usize),
    #[error("buffer capacity {capacity} cannot hold a {required}-sample analysis window")]
    CapacityTooSmall { capacity: usize, required: usize },
    #[error("invalid quality settings: {0}")]
    InvalidQuality(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Shortest moving-average span that leaves a residual around each sample.
pub const MIN_DETREND_SPAN: usize = 3;

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub vitals: VitalsConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Frame sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Channel-combination strategy name. Unknown names use the default.
    pub combination: String,
    /// Region of interest inside each frame.
    pub roi: RoiConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            combination: "default".to_string(),
            roi: RoiConfig::default(),
        }
    }
}

/// Signal buffering and detrending configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Rolling buffer capacity in samples.
    pub capacity: usize,
    /// Centered moving-average span used for detrending, in samples.
    pub detrend_span: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            capacity: 600, // ~20s at 30 Hz
            detrend_span: 31,
        }
    }
}

/// Valley detection and vitals estimation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    /// Lowest plausible heart rate; longer intervals are outliers.
    pub min_bpm: f64,
    /// Highest plausible heart rate; sets the refractory interval.
    pub max_bpm: f64,
    /// Number of recent in-band intervals used per estimate.
    pub interval_count: usize,
    /// Coefficient of variation at which confidence reaches zero.
    pub cv_threshold: f64,
    /// Number of accepted valleys kept in history.
    pub valley_history: usize,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 240.0,
            interval_count: 10,
            cv_threshold: 0.5,
            valley_history: 20,
        }
    }
}

impl VitalsConfig {
    /// Minimum spacing between accepted valleys in milliseconds.
    pub fn refractory_ms(&self) -> f64 {
        60_000.0 / self.max_bpm
    }

    /// Accepted interval band in milliseconds, shortest first.
    pub fn interval_band_ms(&self) -> (f64, f64) {
        (60_000.0 / self.max_bpm, 60_000.0 / self.min_bpm)
    }
}

/// Signal quality assessment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum raw samples before quality is assessed.
    pub min_samples: usize,
    /// Number of most recent samples fed to the feature extractor.
    pub window: usize,
    /// Assumed sample rate for spectral features.
    pub sample_rate_hz: f64,
    /// Samples between consecutive assessments.
    pub interval: usize,
    /// Run inference on a background worker thread.
    pub background: bool,
    /// Location of the model artifact.
    pub model_path: Option<PathBuf>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_samples: 100,
            window: 256,
            sample_rate_hz: 30.0,
            interval: 15,
            background: true,
            model_path: None,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run continuously (true) or process fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to process if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
    /// Subject whose record is stored at the end of the run.
    pub subject: Option<String>,
    /// JSON-lines record store location.
    pub store_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 600,
            metrics_port: 9090,
            subject: None,
            store_path: None,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section and their cross-section constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.sampler.roi.validate()?;

        let vitals = &self.vitals;
        let band_ok =
            vitals.min_bpm > 0.0 && vitals.max_bpm > vitals.min_bpm && vitals.max_bpm.is_finite();
        if !band_ok {
            return Err(ConfigError::InvalidHeartRateBand {
                min_bpm: vitals.min_bpm,
                max_bpm: vitals.max_bpm,
            });
        }

        let quality = &self.quality;
        if quality.min_samples == 0 || quality.window < quality.min_samples {
            return Err(ConfigError::InvalidQuality(format!(
                "window {} must cover min_samples {}",
                quality.window, quality.min_samples
            )));
        }
        if !(quality.sample_rate_hz > 0.0 && quality.sample_rate_hz.is_finite()) {
            return Err(ConfigError::InvalidQuality(format!(
                "sample rate {} Hz",
                quality.sample_rate_hz
            )));
        }

        if self.signal.detrend_span < MIN_DETREND_SPAN {
            return Err(ConfigError::DetrendSpanTooShort(self.signal.detrend_span));
        }

        let required = quality.window.max(self.signal.detrend_span);
        if self.signal.capacity < required {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.signal.capacity,
                required,
            });
        }
        Ok(())
    }
}
