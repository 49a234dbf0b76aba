//! Hardware webcam source backed by `nokhwa`.

use std::time::Instant;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};

use super::{Camera, CameraError, CaptureConfig, Frame};

/// A real camera opened through the platform's native backend.
#[derive(Default)]
pub struct DeviceCamera {
    inner: Option<nokhwa::Camera>,
    started: Option<Instant>,
    sequence: u64,
}

impl DeviceCamera {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Format requested from the device: the configured size and rate.
fn requested_format(config: &CaptureConfig) -> CameraFormat {
    CameraFormat::new_from(config.width, config.height, FrameFormat::MJPEG, config.fps)
}

impl Camera for DeviceCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let requested = requested_format(config);
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(requested));
        let mut camera = nokhwa::Camera::new(CameraIndex::Index(config.device_id), format)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let actual = camera.camera_format();
        tracing::info!(
            device = config.device_id,
            width = actual.width(),
            height = actual.height(),
            fps = actual.frame_rate(),
            "Camera stream opened"
        );
        self.inner = Some(camera);
        self.started = Some(Instant::now());
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let camera = self.inner.as_mut().ok_or(CameraError::NotInitialized)?;
        let started = self.started.ok_or(CameraError::NotInitialized)?;

        // `frame()` blocks until the next frame, so an error means the
        // stream itself failed.
        let buffer = camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let (width, height) = (image.width(), image.height());
        self.sequence += 1;
        Ok(Frame::new(
            image.into_raw(),
            width,
            height,
            started.elapsed(),
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.inner.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(error = %e, "Failed to stop camera stream");
            }
            tracing::info!("Camera closed");
        }
        self.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_format_follows_config() {
        let config = CaptureConfig {
            width: 320,
            height: 240,
            fps: 15,
            ..Default::default()
        };
        let format = requested_format(&config);
        assert_eq!((format.width(), format.height()), (320, 240));
        assert_eq!(format.frame_rate(), 15);
    }
}
