//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and a synthetic source for testing.

use std::f64::consts::PI;
use std::time::Duration;

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use thiserror::Error;

use super::frame::CHANNELS;
use super::{CaptureConfig, Frame};

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// No frame is ready yet. The caller skips this tick.
    #[error("no frame available")]
    FrameUnavailable,
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// `capture` never fabricates a default frame: when nothing is ready it
/// returns [`CameraError::FrameUnavailable`].
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    fn close(&mut self);
}

/// Tracks consecutive [`CameraError::FrameUnavailable`] ticks so a source
/// that never delivers again is treated as failed.
#[derive(Debug, Clone)]
pub struct StallGuard {
    limit: u32,
    consecutive: u32,
}

impl StallGuard {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    /// Allows `seconds` worth of empty ticks at `fps`.
    pub fn for_duration(fps: u32, seconds: u32) -> Self {
        Self::new(fps.max(1).saturating_mul(seconds.max(1)))
    }

    /// Records a delivered frame.
    pub fn frame(&mut self) {
        self.consecutive = 0;
    }

    /// Records an empty tick. Fails once `limit` empty ticks arrive in a row.
    pub fn unavailable(&mut self) -> Result<(), CameraError> {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            return Err(CameraError::CaptureFailed(format!(
                "no frame for {} consecutive ticks",
                self.consecutive
            )));
        }
        Ok(())
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Base skin tone of the synthetic subject.
const SKIN_RGB: [f64; 3] = [180.0, 120.0, 100.0];

/// Background color outside the face patch (fails the skin test).
const BACKGROUND_RGB: [u8; 3] = [90, 90, 90];

/// Fraction of each frame edge painted as background.
const BORDER_FRACTION: f64 = 0.1;

/// Synthetic camera producing a pulsing skin patch.
///
/// The green channel carries a cosine at `pulse_bpm` plus slow linear
/// drift and seeded per-pixel noise. Frames are timestamped on an exact
/// `1/fps` grid so tests are reproducible.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    slot: u64,
    pulse_bpm: f64,
    amplitude: f64,
    drift_per_sec: f64,
    noise: f64,
    drop_every: Option<u64>,
    seed: u64,
    rng: ChaCha8Rng,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::with_pulse(72.0)
    }

    /// Creates a camera whose subject has the given heart rate.
    pub fn with_pulse(pulse_bpm: f64) -> Self {
        let seed = 0x5eed;
        Self {
            config: None,
            sequence: 0,
            slot: 0,
            pulse_bpm,
            amplitude: 2.0,
            drift_per_sec: 0.5,
            noise: 1.5,
            drop_every: None,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sets the pulse amplitude in green-channel levels.
    pub fn amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Sets the illumination drift in levels per second.
    pub fn drift(mut self, drift_per_sec: f64) -> Self {
        self.drift_per_sec = drift_per_sec;
        self
    }

    /// Sets the per-pixel noise amplitude in levels.
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Reports every `n`th frame slot as unavailable.
    pub fn drop_every(mut self, n: u64) -> Self {
        self.drop_every = (n > 0).then_some(n);
        self
    }

    /// Reseeds the noise generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Uniform noise in `[-1, 1]`.
    fn unit_noise(&mut self) -> f64 {
        (self.rng.next_u32() as f64 / u32::MAX as f64) * 2.0 - 1.0
    }

    fn render(&mut self, config: &CaptureConfig, t_secs: f64) -> Vec<u8> {
        let pulse = self.amplitude * (2.0 * PI * self.pulse_bpm / 60.0 * t_secs).cos();
        let drift = self.drift_per_sec * t_secs;
        let base = [
            SKIN_RGB[0] + drift,
            SKIN_RGB[1] + drift + pulse,
            SKIN_RGB[2] + drift,
        ];

        let (w, h) = (config.width as usize, config.height as usize);
        let bx = (w as f64 * BORDER_FRACTION) as usize;
        let by = (h as f64 * BORDER_FRACTION) as usize;
        let mut pixels = Vec::with_capacity(w * h * CHANNELS);

        for y in 0..h {
            for x in 0..w {
                let inside = x >= bx && x < w - bx && y >= by && y < h - by;
                if !inside {
                    pixels.extend_from_slice(&BACKGROUND_RGB);
                    continue;
                }
                for level in base {
                    let value = level + self.noise * self.unit_noise();
                    pixels.push(value.round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        pixels
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        self.slot = 0;
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        tracing::info!(pulse_bpm = self.pulse_bpm, "MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.clone().ok_or(CameraError::NotInitialized)?;

        let slot = self.slot;
        self.slot += 1;
        if let Some(n) = self.drop_every {
            if (slot + 1) % n == 0 {
                return Err(CameraError::FrameUnavailable);
            }
        }

        let t_secs = slot as f64 / config.fps as f64;
        let pixels = self.render(&config, t_secs);

        self.sequence += 1;
        Ok(Frame::new(
            pixels,
            config.width,
            config.height,
            Duration::from_secs_f64(t_secs),
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig::with_dimensions(40, 30)
    }

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new();
        let config = small_config();

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);
        assert!((frame2.timestamp_ms() - 1000.0 / 30.0).abs() < 1e-6);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(
            camera.capture(),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_dropped_slots_report_unavailable() {
        let mut camera = MockCamera::new().drop_every(3);
        camera.open(&small_config()).unwrap();

        assert!(camera.capture().is_ok());
        assert!(camera.capture().is_ok());
        assert!(matches!(
            camera.capture(),
            Err(CameraError::FrameUnavailable)
        ));

        // The time grid keeps advancing across a dropped slot.
        let frame = camera.capture().unwrap();
        assert_eq!(frame.sequence(), 3);
        assert!((frame.timestamp_ms() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_stall_guard_trips_on_silent_source() {
        let mut camera = MockCamera::new().drop_every(1);
        camera.open(&small_config()).unwrap();
        let mut guard = StallGuard::new(5);

        let mut ticks = 0;
        let failure = loop {
            ticks += 1;
            assert!(ticks <= 5);
            match camera.capture() {
                Ok(_) => guard.frame(),
                Err(CameraError::FrameUnavailable) => {
                    if let Err(e) = guard.unavailable() {
                        break e;
                    }
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        };

        assert_eq!(ticks, 5);
        assert!(matches!(failure, CameraError::CaptureFailed(_)));
    }

    #[test]
    fn test_stall_guard_resets_on_frame() {
        let mut camera = MockCamera::new().drop_every(2);
        camera.open(&small_config()).unwrap();
        let mut guard = StallGuard::new(2);

        for _ in 0..100 {
            match camera.capture() {
                Ok(_) => guard.frame(),
                Err(_) => guard.unavailable().unwrap(),
            }
        }
        assert!(guard.consecutive() <= 1);
    }

    #[test]
    fn test_border_is_background() {
        let mut camera = MockCamera::new();
        camera.open(&small_config()).unwrap();
        let frame = camera.capture().unwrap();

        assert_eq!(frame.rgb_at(0, 0), Some(BACKGROUND_RGB));
        let [r, g, b] = frame.rgb_at(20, 15).unwrap();
        assert!(r > g && g > b);
    }

    #[test]
    fn test_reopen_is_reproducible() {
        let mut camera = MockCamera::new().seed(7);
        camera.open(&small_config()).unwrap();
        let first = camera.capture().unwrap();

        camera.open(&small_config()).unwrap();
        let again = camera.capture().unwrap();

        assert_eq!(first.pixels(), again.pixels());
    }
}
