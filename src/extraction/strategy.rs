//! Channel-combination strategies.
//!
//! Each strategy is a fixed linear projection of the ROI channel means
//! onto one scalar. The chrominance strategies use the first projection
//! axis of the published CHROM and POS methods; their adaptive
//! alpha-tuning needs a temporal window and is not applied per frame.

use std::fmt;

use super::ChannelMeans;

/// Selects how ROI channel means combine into a pulse sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinationStrategy {
    /// Green channel mean. Strongest hemoglobin absorption of the three.
    #[default]
    Green,
    /// Green minus red, cancels part of the shared illumination change.
    GreenRed,
    /// CHROM X projection: `3R - 2G`.
    Chrom,
    /// POS first projection axis: `G - B`.
    Pos,
    /// Mean of all three channels.
    Luminance,
}

impl CombinationStrategy {
    /// All strategies, in documentation order.
    pub const ALL: [CombinationStrategy; 5] = [
        CombinationStrategy::Green,
        CombinationStrategy::GreenRed,
        CombinationStrategy::Chrom,
        CombinationStrategy::Pos,
        CombinationStrategy::Luminance,
    ];

    /// Resolves a strategy by name.
    ///
    /// Matching is case-insensitive. `"default"` and unknown names map to
    /// [`CombinationStrategy::Green`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" | "green" | "g" => Self::Green,
            "green-red" | "green_red" | "g-r" => Self::GreenRed,
            "chrom" => Self::Chrom,
            "pos" => Self::Pos,
            "luminance" | "rgb" => Self::Luminance,
            other => {
                tracing::debug!(name = other, "Unknown combination, using default");
                Self::default()
            }
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::GreenRed => "green-red",
            Self::Chrom => "chrom",
            Self::Pos => "pos",
            Self::Luminance => "luminance",
        }
    }

    /// Projects channel means onto the scalar pulse sample.
    #[inline]
    pub fn combine(&self, means: &ChannelMeans) -> f64 {
        let ChannelMeans { red, green, blue, .. } = *means;
        match self {
            Self::Green => green,
            Self::GreenRed => green - red,
            Self::Chrom => 3.0 * red - 2.0 * green,
            Self::Pos => green - blue,
            Self::Luminance => (red + green + blue) / 3.0,
        }
    }
}

impl fmt::Display for CombinationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
