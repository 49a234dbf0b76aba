//! Drift removal.
//!
//! Illumination changes and auto-white-balance creep add a slow baseline
//! under the pulse. Subtracting a centered moving average removes it; the
//! window is symmetric, so minima stay at the same sample index.

use serde::{Deserialize, Serialize};

/// Detrending method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detrender {
    /// Subtract a centered moving average spanning `span` samples.
    ///
    /// Even spans are widened by one so the window stays centered.
    MovingAverage { span: usize },
    /// Subtract the least-squares line through the window.
    Linear,
}

impl Default for Detrender {
    fn default() -> Self {
        Self::MovingAverage { span: 31 }
    }
}

impl Detrender {
    /// Creates a moving-average detrender.
    pub fn moving_average(span: usize) -> Self {
        Self::MovingAverage { span }
    }

    /// Number of samples on each side of the centre the method looks at.
    ///
    /// Zero for [`Detrender::Linear`], which has no local window.
    pub fn half_span(&self) -> usize {
        match *self {
            Self::MovingAverage { span } => span / 2,
            Self::Linear => 0,
        }
    }

    /// Returns the drift-removed, zero-mean sequence.
    ///
    /// The output has the same length as the input. Empty input yields
    /// empty output.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<f64> = match *self {
            Self::MovingAverage { .. } => (0..values.len())
                .map(|i| self.residual_at(values, i))
                .collect(),
            Self::Linear => linear_residuals(values),
        };

        let mean = out.iter().sum::<f64>() / out.len() as f64;
        out.iter_mut().for_each(|v| *v -= mean);
        out
    }

    /// Residual of one point against its centered moving average.
    ///
    /// The averaging window is truncated at the slice edges. For
    /// [`Detrender::Linear`] this is the residual against the full-slice fit.
    pub fn residual_at(&self, values: &[f64], index: usize) -> f64 {
        let Some(&value) = values.get(index) else {
            return 0.0;
        };
        match *self {
            Self::MovingAverage { span } => {
                let half = span / 2;
                let lo = index.saturating_sub(half);
                let hi = (index + half + 1).min(values.len());
                let local = &values[lo..hi];
                value - local.iter().sum::<f64>() / local.len() as f64
            }
            Self::Linear => {
                let (slope, intercept) = least_squares(values);
                value - (slope * index as f64 + intercept)
            }
        }
    }
}

/// Slope and intercept of the least-squares line through `(i, values[i])`.
fn least_squares(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

fn linear_residuals(values: &[f64]) -> Vec<f64> {
    let (slope, intercept) = least_squares(values);
    values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (slope * i as f64 + intercept))
        .collect()
}
