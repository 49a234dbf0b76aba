//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing RGB frames from a
//! camera and managing camera configuration. Frames are the raw input to
//! the sampler; nothing here knows about pulse signals.

mod camera;
mod config;
#[cfg(feature = "camera")]
mod device;
mod frame;

pub use camera::{Camera, CameraError, MockCamera, StallGuard};
pub use config::CaptureConfig;
#[cfg(feature = "camera")]
pub use device::DeviceCamera;
pub use frame::{Frame, CHANNELS};
