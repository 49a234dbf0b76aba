//! Region-of-interest location and per-channel statistics.
//!
//! The ROI is a fixed rectangle expressed as fractions of the frame. When
//! the skin filter is on, only pixels passing a YCbCr skin test are
//! averaged, and the ROI counts as "not located" if too few of them are
//! present (subject out of frame, lens covered, lights off).

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::config::ConfigError;

/// Cb range accepted as skin (ITU-R BT.601, full range).
const SKIN_CB: (f64, f64) = (77.0, 127.0);
/// Cr range accepted as skin.
const SKIN_CR: (f64, f64) = (133.0, 173.0);

/// Region of interest expressed as fractions of frame width and height.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Left edge as a fraction of width.
    pub x: f64,
    /// Top edge as a fraction of height.
    pub y: f64,
    /// Width as a fraction of frame width.
    pub width: f64,
    /// Height as a fraction of frame height.
    pub height: f64,
    /// Average only skin-colored pixels.
    pub skin_filter: bool,
    /// Minimum fraction of ROI pixels that must be skin.
    pub min_skin_coverage: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            x: 0.25,
            y: 0.2,
            width: 0.5,
            height: 0.6,
            skin_filter: true,
            min_skin_coverage: 0.3,
        }
    }
}

impl RoiConfig {
    /// Uses the whole frame without skin filtering.
    pub fn full_frame() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            skin_filter: false,
            min_skin_coverage: 0.0,
        }
    }

    /// Validates that the rectangle lies inside the frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(self.x) || !unit(self.y) {
            return Err(ConfigError::InvalidRoi(format!("origin ({}, {})", self.x, self.y)));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ConfigError::InvalidRoi("empty rectangle".to_string()));
        }
        if self.x + self.width > 1.0 + f64::EPSILON || self.y + self.height > 1.0 + f64::EPSILON {
            return Err(ConfigError::InvalidRoi("rectangle exceeds frame".to_string()));
        }
        if !unit(self.min_skin_coverage) {
            return Err(ConfigError::InvalidRoi(format!(
                "skin coverage {}",
                self.min_skin_coverage
            )));
        }
        Ok(())
    }
}

/// Mean channel intensities over the located region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    /// Number of pixels that contributed.
    pub pixels: usize,
}

/// Locates the ROI in a frame and averages its channels.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    config: RoiConfig,
}

impl RegionOfInterest {
    pub fn new(config: RoiConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RoiConfig {
        &self.config
    }

    /// Returns the pixel rectangle `(x0, y0, x1, y1)` for the given frame size.
    fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let scale =
            |fraction: f64, extent: u32| ((fraction * extent as f64).round() as u32).min(extent);
        let x0 = scale(self.config.x, width);
        let y0 = scale(self.config.y, height);
        let x1 = scale(self.config.x + self.config.width, width).max(x0);
        let y1 = scale(self.config.y + self.config.height, height).max(y0);
        (x0, y0, x1, y1)
    }

    /// Averages the ROI channels, or `None` if the region cannot be located.
    pub fn measure(&self, frame: &Frame) -> Option<ChannelMeans> {
        let (x0, y0, x1, y1) = self.bounds(frame.width(), frame.height());
        let total = ((x1 - x0) as usize) * ((y1 - y0) as usize);
        if total == 0 {
            return None;
        }

        let mut sums = [0.0f64; 3];
        let mut count = 0usize;
        for y in y0..y1 {
            for x in x0..x1 {
                let rgb = frame.rgb_at(x, y)?;
                if self.config.skin_filter && !is_skin(rgb) {
                    continue;
                }
                for (sum, &c) in sums.iter_mut().zip(rgb.iter()) {
                    *sum += c as f64;
                }
                count += 1;
            }
        }

        let coverage = count as f64 / total as f64;
        if count == 0 || coverage < self.config.min_skin_coverage {
            tracing::trace!(coverage, "ROI not located");
            return None;
        }

        let n = count as f64;
        Some(ChannelMeans {
            red: sums[0] / n,
            green: sums[1] / n,
            blue: sums[2] / n,
            pixels: count,
        })
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self::new(RoiConfig::default())
    }
}

/// YCbCr chrominance skin test.
pub fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    (SKIN_CB.0..=SKIN_CB.1).contains(&cb) && (SKIN_CR.0..=SKIN_CR.1).contains(&cr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SKIN: [u8; 3] = [180, 120, 100];
    const GRAY: [u8; 3] = [90, 90, 90];

    #[test]
    fn test_skin_classification() {
        assert!(is_skin(SKIN));
        assert!(!is_skin(GRAY));
        assert!(!is_skin([20, 40, 200]));
    }

    #[test]
    fn test_skin_frame_measured() {
        let frame = Frame::solid(SKIN, 20, 20, Duration::ZERO, 1);
        let means = RegionOfInterest::default().measure(&frame).unwrap();

        assert!((means.green - 120.0).abs() < 1e-9);
        assert_eq!(means.pixels, 10 * 12);
    }

    #[test]
    fn test_non_skin_frame_not_located() {
        let frame = Frame::solid(GRAY, 20, 20, Duration::ZERO, 1);
        assert!(RegionOfInterest::default().measure(&frame).is_none());
    }

    #[test]
    fn test_full_frame_ignores_skin() {
        let frame = Frame::solid(GRAY, 8, 8, Duration::ZERO, 1);
        let means = RegionOfInterest::new(RoiConfig::full_frame())
            .measure(&frame)
            .unwrap();
        assert_eq!(means.pixels, 64);
        assert!((means.red - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_outside_frame_rejected() {
        let config = RoiConfig {
            x: 0.8,
            width: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoi(_))));
    }
}
