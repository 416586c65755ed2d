//! Artifact generations
//!
//! A generation is the immutable output of one successful training run:
//! vocabulary, model weights and the manifest describing them. Generations
//! are only ever created whole and never edited after publication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::prediction::Classification;
use super::record::Tier;

/// Bumped whenever the on-disk bundle layout changes
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Monotonic generation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

impl GenerationId {
    const DIR_PREFIX: &'static str = "gen-";

    pub fn next(self) -> Self {
        GenerationId(self.0 + 1)
    }

    /// Directory name under the artifacts root
    pub fn dir_name(&self) -> String {
        format!("{}{:08}", Self::DIR_PREFIX, self.0)
    }

    /// Inverse of [`GenerationId::dir_name`]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix(Self::DIR_PREFIX)?
            .parse::<u64>()
            .ok()
            .map(GenerationId)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which partition a metric was computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationSet {
    Validation,
    /// Corpus too small to hold anything out
    Training,
}

/// Accuracy reported by the trainer for a generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetric {
    pub accuracy: f64,
    pub samples: usize,
    pub evaluated_on: EvaluationSet,
}

/// Word index built from the training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub oov_token: String,
    pub max_sequence_len: usize,
    /// Word → token id. Id 0 is reserved, id 1 is the OOV token.
    pub word_index: BTreeMap<String, u32>,
}

/// Multinomial naive Bayes parameters in log space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    /// Class order of the rows below
    pub classes: Vec<Tier>,
    pub log_priors: Vec<f64>,
    /// `log_likelihoods[class][token_id]`
    pub log_likelihoods: Vec<Vec<f64>>,
}

impl ModelWeights {
    /// One prior and one likelihood row per class, at least one class
    pub fn check_shape(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes == 0 {
            return Err("weights have no classes".to_string());
        }
        if self.log_priors.len() != classes || self.log_likelihoods.len() != classes {
            return Err(format!(
                "weights shape mismatch: {} classes, {} priors, {} likelihood rows",
                classes,
                self.log_priors.len(),
                self.log_likelihoods.len()
            ));
        }
        Ok(())
    }
}

/// Trainer output before publication
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    pub vocabulary: Vocabulary,
    pub weights: ModelWeights,
}

/// Everything the artifact manager needs to publish a generation
#[derive(Debug, Clone)]
pub struct GenerationCandidate {
    pub bundle: ArtifactBundle,
    pub metric: ValidationMetric,
    pub trained_row_count: usize,
    pub trainer: String,
}

/// Manifest stored alongside a generation's files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub format_version: u32,
    pub generation_id: GenerationId,
    pub created_at: DateTime<Utc>,
    pub trainer: String,
    pub trained_row_count: usize,
    pub metric: ValidationMetric,
    pub vocabulary_sha256: String,
    pub weights_sha256: String,
}

/// Pointer record naming the current generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPointer {
    pub generation_id: GenerationId,
    pub directory: String,
    pub published_at: DateTime<Utc>,
}

/// Fully loaded, verified generation
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactGeneration {
    pub manifest: GenerationManifest,
    pub vocabulary: Vocabulary,
    pub weights: ModelWeights,
}

impl ArtifactGeneration {
    pub fn id(&self) -> GenerationId {
        self.manifest.generation_id
    }

    /// Classify already-sanitized text
    pub fn classify(&self, text: &str) -> Classification {
        let tokens = self.vocabulary.encode(text);
        let probabilities = self.weights.predict_proba(&tokens);

        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        Classification {
            label: self.weights.classes[best],
            confidence,
            probabilities: self
                .weights
                .classes
                .iter()
                .zip(probabilities.iter())
                .map(|(tier, p)| (*tier, *p))
                .collect(),
            generation_id: self.id(),
        }
    }
}
