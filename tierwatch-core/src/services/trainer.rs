//! Model trainer seam
//!
//! Training is CPU-bound and synchronous; the coordinator runs it on the
//! blocking pool.

use thiserror::Error;

use crate::models::{ArtifactBundle, CorpusRow, EvaluationSet, ValidationMetric};

/// Trainer failure
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Invalid training parameters: {0}")]
    InvalidParameters(String),

    #[error("Trainer error: {0}")]
    Internal(String),
}

/// Output of a successful training run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub bundle: ArtifactBundle,
    pub metric: ValidationMetric,
}

pub trait ModelTrainer: Send + Sync {
    /// Recorded in generation manifests
    fn name(&self) -> &str;

    fn train(
        &self,
        train_set: &[CorpusRow],
        validation_set: &[CorpusRow],
    ) -> Result<TrainedModel, TrainingError>;
}

/// Accuracy of `bundle` on `validation_set`, falling back to `train_set`
/// when nothing was held out
pub fn evaluate(
    bundle: &ArtifactBundle,
    train_set: &[CorpusRow],
    validation_set: &[CorpusRow],
) -> ValidationMetric {
    let (rows, evaluated_on) = if validation_set.is_empty() {
        (train_set, EvaluationSet::Training)
    } else {
        (validation_set, EvaluationSet::Validation)
    };

    let correct = rows
        .iter()
        .filter(|row| bundle.predict(&row.text) == row.label)
        .count();

    ValidationMetric {
        accuracy: if rows.is_empty() {
            0.0
        } else {
            correct as f64 / rows.len() as f64
        },
        samples: rows.len(),
        evaluated_on,
    }
}
