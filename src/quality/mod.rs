//! Signal quality assessment.
//!
//! A raw sample window is summarised into [`QualityFeatures`] and handed
//! to a [`QualityModel`], whose class probabilities become a
//! [`QualityResult`]. Inference runs either inline through
//! [`QualityClassifier`] or on a background [`QualityWorker`].
//!
//! ```text
//! raw window → FeatureExtractor → QualityFeatures → QualityModel → QualityResult
//! ```

mod classifier;
mod features;
mod model;
mod worker;

pub use classifier::{assess_window, QualityClassifier, QualityLabel, QualityResult};
pub use features::{
    magnitude_spectrum, FeatureExtractor, QualityFeatures, FEATURE_COUNT, FEATURE_NAMES,
};
pub use model::{
    Activation, ClassProbabilities, DenseLayer, DenseModel, InferenceError, QualityModel,
    Standardization, CLASS_COUNT,
};
pub use worker::{QualityJob, QualityOutcome, QualityWorker};
