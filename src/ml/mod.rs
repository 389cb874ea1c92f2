//! Model artifacts and inference
//!
//! Pipelines and the label encoder are trained elsewhere and shipped as JSON
//! artifacts; this module loads, caches and runs them.

pub mod encoder;
pub mod inference;
pub mod pipeline;
pub mod registry;

use ndarray::Array2;

use crate::data::{ChurnResult, FeatureRow};

pub use encoder::{EncoderOrigin, LabelEncoder, DEFAULT_LABELS};
pub use inference::{predict_batch, predict_one, PredictionResult};
pub use pipeline::{DecisionTree, Estimator, ModelPipeline, PreprocessStep, SchemaDescriptor};
pub use registry::{ModelKind, ModelRegistry};

/// A fitted classifier over feature rows
pub trait Classifier {
    /// Display name reported with predictions
    fn name(&self) -> &str;

    /// Predicted class index per row
    fn predict(&self, rows: &[FeatureRow]) -> ChurnResult<Vec<usize>>;

    /// Per-class probabilities, one row per input row
    fn predict_proba(&self, rows: &[FeatureRow]) -> ChurnResult<Array2<f64>>;
}
