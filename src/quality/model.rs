//! Quality inference capability.
//!
//! The pipeline only needs `classify(features) -> probabilities[3]`.
//! [`DenseModel`] provides that from a small feed-forward network stored
//! as JSON; tests and other runtimes plug in through [`QualityModel`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{QualityFeatures, FEATURE_COUNT};

/// Number of quality classes.
pub const CLASS_COUNT: usize = 3;

/// Class probabilities in `[bad, acceptable, excellent]` order.
pub type ClassProbabilities = [f64; CLASS_COUNT];

/// Errors raised while loading or running a quality model.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("no quality model loaded")]
    Unavailable,
    #[error("window has {got} samples, {need} required")]
    InsufficientData { got: usize, need: usize },
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("layer {layer}: expected {expected} inputs, got {got}")]
    ShapeMismatch {
        layer: usize,
        expected: usize,
        got: usize,
    },
    #[error("model produced invalid output: {0}")]
    InvalidOutput(String),
    #[error("inference worker stopped")]
    WorkerStopped,
}

/// Opaque pre-trained quality classifier.
pub trait QualityModel: Send {
    /// Maps a feature vector to class probabilities.
    fn classify(&self, features: &QualityFeatures) -> Result<ClassProbabilities, InferenceError>;
}

impl<F> QualityModel for F
where
    F: Fn(&QualityFeatures) -> Result<ClassProbabilities, InferenceError> + Send,
{
    fn classify(&self, features: &QualityFeatures) -> Result<ClassProbabilities, InferenceError> {
        self(features)
    }
}

/// Layer activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(&self, values: &mut [f64]) {
        match self {
            Self::Linear => {}
            Self::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Self::Sigmoid => values.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
            Self::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Self::Softmax => {
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                values.iter_mut().for_each(|v| *v = (*v - max).exp());
                let sum: f64 = values.iter().sum();
                if sum > 0.0 {
                    values.iter_mut().for_each(|v| *v /= sum);
                }
            }
        }
    }
}

/// One fully connected layer.
///
/// `weights[i][j]` connects input `i` to output `j`, the layout Keras
/// uses for dense kernels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.len()
    }

    fn outputs(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (o, w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        self.activation.apply(&mut out);
        out
    }
}

/// Per-feature standardization applied before the first layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardization {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Feed-forward network loaded from a JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    #[serde(default)]
    pub standardize: Option<Standardization>,
    pub layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Builds a model and validates its shape.
    pub fn new(
        standardize: Option<Standardization>,
        layers: Vec<DenseLayer>,
    ) -> Result<Self, InferenceError> {
        let model = Self { standardize, layers };
        model.validate()?;
        Ok(model)
    }

    /// Loads and validates a model artifact from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::Load(format!("{}: {e}", path.display())))?;
        let model = Self::from_json_str(&content)?;
        tracing::info!(path = %path.display(), layers = model.layers.len(), "Quality model loaded");
        Ok(model)
    }

    /// Parses and validates a model artifact.
    pub fn from_json_str(content: &str) -> Result<Self, InferenceError> {
        let model: DenseModel =
            serde_json::from_str(content).map_err(|e| InferenceError::Load(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if let Some(norm) = &self.standardize {
            if norm.mean.len() != FEATURE_COUNT || norm.scale.len() != FEATURE_COUNT {
                return Err(InferenceError::Load(format!(
                    "standardization must have {FEATURE_COUNT} entries"
                )));
            }
        }
        if self.layers.is_empty() {
            return Err(InferenceError::Load("model has no layers".to_string()));
        }

        let mut width = FEATURE_COUNT;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.inputs() != width {
                return Err(InferenceError::ShapeMismatch {
                    layer: index,
                    expected: layer.inputs(),
                    got: width,
                });
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != layer.outputs()) {
                return Err(InferenceError::ShapeMismatch {
                    layer: index,
                    expected: layer.outputs(),
                    got: row.len(),
                });
            }
            width = layer.outputs();
        }

        if width != CLASS_COUNT {
            return Err(InferenceError::Load(format!(
                "final layer has {width} outputs, {CLASS_COUNT} required"
            )));
        }
        Ok(())
    }
}

impl QualityModel for DenseModel {
    fn classify(&self, features: &QualityFeatures) -> Result<ClassProbabilities, InferenceError> {
        let mut activations: Vec<f64> = features.as_slice().to_vec();
        if let Some(norm) = &self.standardize {
            for ((x, mean), scale) in activations.iter_mut().zip(&norm.mean).zip(&norm.scale) {
                *x = if *scale != 0.0 { (*x - mean) / scale } else { 0.0 };
            }
        }

        for layer in &self.layers {
            activations = layer.forward(&activations);
        }

        <ClassProbabilities>::try_from(activations.as_slice())
            .map_err(|_| InferenceError::InvalidOutput(format!("{} outputs", activations.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single softmax layer that scores class `j` by feature `j`.
    fn identity_model() -> DenseModel {
        let weights = (0..FEATURE_COUNT)
            .map(|i| (0..CLASS_COUNT).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        DenseModel::new(
            None,
            vec![DenseLayer {
                weights,
                bias: vec![0.0; CLASS_COUNT],
                activation: Activation::Softmax,
            }],
        )
        .unwrap()
    }

    fn features(first: [f64; 3]) -> QualityFeatures {
        let mut values = [0.0; FEATURE_COUNT];
        values[..3].copy_from_slice(&first);
        QualityFeatures::from_array(values)
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = identity_model().classify(&features([1.0, 2.0, 3.0])).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_wrong_input_width_rejected() {
        let layer = DenseLayer {
            weights: vec![vec![0.0; CLASS_COUNT]; 5],
            bias: vec![0.0; CLASS_COUNT],
            activation: Activation::Softmax,
        };
        assert!(matches!(
            DenseModel::new(None, vec![layer]),
            Err(InferenceError::ShapeMismatch { layer: 0, .. })
        ));
    }

    #[test]
    fn test_wrong_output_width_rejected() {
        let layer = DenseLayer {
            weights: vec![vec![0.0; 4]; FEATURE_COUNT],
            bias: vec![0.0; 4],
            activation: Activation::Softmax,
        };
        assert!(matches!(
            DenseModel::new(None, vec![layer]),
            Err(InferenceError::Load(_))
        ));
    }

    #[test]
    fn test_json_artifact_round_trip() {
        let json = serde_json::to_string(&identity_model()).unwrap();
        let loaded = DenseModel::from_json_str(&json).unwrap();
        let probs = loaded.classify(&features([0.0, 0.0, 5.0])).unwrap();
        assert!(probs[2] > 0.9);
    }

    #[test]
    fn test_standardization_applied() {
        let mut model = identity_model();
        model.standardize = Some(Standardization {
            mean: vec![10.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        });
        // After subtracting 10 the first feature dominates.
        let probs = model.classify(&features([20.0, 10.0, 10.0])).unwrap();
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        assert!(matches!(
            DenseModel::from_json_file("/nonexistent/model.json"),
            Err(InferenceError::Load(_))
        ));
    }

    #[test]
    fn test_closure_is_a_model() {
        let stub = |_: &QualityFeatures| Ok::<_, InferenceError>([0.1, 0.2, 0.7]);
        assert_eq!(stub.classify(&QualityFeatures::zeros()).unwrap(), [0.1, 0.2, 0.7]);
    }
}
