//! Quality labelling.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::features::FeatureExtractor;
use super::model::{ClassProbabilities, InferenceError, QualityModel};

/// Signal quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    Bad,
    Acceptable,
    Excellent,
}

impl QualityLabel {
    /// Labels in classifier output order.
    pub const ALL: [QualityLabel; 3] = [Self::Bad, Self::Acceptable, Self::Excellent];

    /// Position in the classifier output.
    pub fn index(&self) -> usize {
        match self {
            Self::Bad => 0,
            Self::Acceptable => 1,
            Self::Excellent => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bad => "bad",
            Self::Acceptable => "acceptable",
            Self::Excellent => "excellent",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest quality verdict. The label is unset before the first successful
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityResult {
    pub label: Option<QualityLabel>,
    /// 0-100.
    pub confidence: f64,
}

impl QualityResult {
    /// Picks the most probable class.
    ///
    /// Returns `None` if any probability is not finite. Ties keep the
    /// lower-quality class.
    pub fn from_probabilities(probabilities: &ClassProbabilities) -> Option<Self> {
        if probabilities.iter().any(|p| !p.is_finite()) {
            return None;
        }
        let (index, &best) = probabilities
            .iter()
            .enumerate()
            .fold(None, |acc: Option<(usize, &f64)>, (i, p)| match acc {
                Some((_, b)) if *b >= *p => acc,
                _ => Some((i, p)),
            })?;

        Some(Self {
            label: Some(QualityLabel::ALL[index]),
            confidence: (best * 100.0).clamp(0.0, 100.0),
        })
    }
}

/// Runs feature extraction and inference on one window.
pub fn assess_window(
    extractor: &FeatureExtractor,
    model: &dyn QualityModel,
    window: &[f64],
) -> Result<QualityResult, InferenceError> {
    if window.len() < extractor.min_samples() {
        return Err(InferenceError::InsufficientData {
            got: window.len(),
            need: extractor.min_samples(),
        });
    }
    let features = extractor.extract(window);
    let probabilities = model.classify(&features)?;
    QualityResult::from_probabilities(&probabilities)
        .ok_or_else(|| InferenceError::InvalidOutput(format!("{probabilities:?}")))
}

/// Inline quality classifier holding the last verdict.
///
/// Whenever a verdict cannot be produced (no model, short window, model
/// failure) the previous result is returned unchanged.
pub struct QualityClassifier {
    extractor: FeatureExtractor,
    model: Option<Box<dyn QualityModel>>,
    last: QualityResult,
    failures: u64,
}

impl QualityClassifier {
    pub fn new(extractor: FeatureExtractor, model: Option<Box<dyn QualityModel>>) -> Self {
        Self {
            extractor,
            model,
            last: QualityResult::default(),
            failures: 0,
        }
    }

    /// Assesses a raw window and returns the current verdict.
    pub fn assess(&mut self, window: &[f64]) -> QualityResult {
        let Some(model) = self.model.as_deref() else {
            return self.last;
        };

        match assess_window(&self.extractor, model, window) {
            Ok(result) => self.last = result,
            Err(InferenceError::InsufficientData { got, need }) => {
                tracing::trace!(got, need, "Quality window too short");
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(error = %e, "Quality inference failed, keeping previous result");
            }
        }
        self.last
    }

    /// Returns the last verdict.
    #[inline]
    pub fn last(&self) -> QualityResult {
        self.last
    }

    /// Returns true if a model is attached.
    #[inline]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Returns the number of failed inferences.
    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Returns the feature extractor.
    #[inline]
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Forgets the last verdict. The model stays loaded.
    pub fn reset(&mut self) {
        self.last = QualityResult::default();
        self.failures = 0;
    }
}
