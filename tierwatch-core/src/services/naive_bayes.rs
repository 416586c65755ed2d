//! Multinomial naive Bayes trainer
//!
//! Laplace-smoothed token likelihoods over the fitted vocabulary, with
//! add-one smoothed class priors so that a tier absent from the corpus still
//! gets a finite score.

use crate::models::{ArtifactBundle, CorpusRow, ModelWeights, Tier, Vocabulary};
use crate::services::tokenizer::OOV_ID;
use crate::services::trainer::{evaluate, ModelTrainer, TrainedModel, TrainingError};

/// Built-in trainer
#[derive(Debug, Clone)]
pub struct NaiveBayesTrainer {
    pub max_vocab_words: usize,
    pub max_sequence_len: usize,
    /// Additive smoothing constant
    pub alpha: f64,
}

impl NaiveBayesTrainer {
    pub fn new(max_vocab_words: usize, max_sequence_len: usize) -> Self {
        Self {
            max_vocab_words,
            max_sequence_len,
            alpha: 1.0,
        }
    }
}

impl Default for NaiveBayesTrainer {
    fn default() -> Self {
        Self::new(10_000, 100)
    }
}

impl ModelTrainer for NaiveBayesTrainer {
    fn name(&self) -> &str {
        "naive_bayes"
    }

    fn train(
        &self,
        train_set: &[CorpusRow],
        validation_set: &[CorpusRow],
    ) -> Result<TrainedModel, TrainingError> {
        if train_set.is_empty() {
            return Err(TrainingError::EmptyTrainingSet);
        }
        if self.max_vocab_words == 0 || self.max_sequence_len == 0 {
            return Err(TrainingError::InvalidParameters(
                "vocabulary and sequence length must be positive".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(TrainingError::InvalidParameters(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }

        let vocabulary = Vocabulary::fit(
            train_set.iter().map(|row| row.text.as_str()),
            self.max_vocab_words,
            self.max_sequence_len,
        );
        let vocab_size = vocabulary.size();
        let classes = Tier::ALL.to_vec();

        let mut doc_counts = vec![0u64; classes.len()];
        let mut token_counts = vec![vec![0u64; vocab_size]; classes.len()];
        let mut token_totals = vec![0u64; classes.len()];

        for row in train_set {
            let class = row.label.index();
            doc_counts[class] += 1;
            for token in vocabulary.encode(&row.text) {
                token_counts[class][token as usize] += 1;
                token_totals[class] += 1;
            }
        }

        let total_docs = train_set.len() as f64;
        let log_priors = doc_counts
            .iter()
            .map(|&n| ((n as f64 + 1.0) / (total_docs + classes.len() as f64)).ln())
            .collect();

        let log_likelihoods = token_counts
            .iter()
            .zip(token_totals.iter())
            .map(|(counts, &total)| {
                let denominator = total as f64 + self.alpha * vocab_size as f64;
                counts
                    .iter()
                    .map(|&c| ((c as f64 + self.alpha) / denominator).ln())
                    .collect()
            })
            .collect();

        let bundle = ArtifactBundle {
            vocabulary,
            weights: ModelWeights {
                classes,
                log_priors,
                log_likelihoods,
            },
        };
        let metric = evaluate(&bundle, train_set, validation_set);

        tracing::debug!(
            train = train_set.len(),
            validation = validation_set.len(),
            vocab_size,
            accuracy = metric.accuracy,
            "Naive Bayes model trained"
        );

        Ok(TrainedModel { bundle, metric })
    }
}

impl ModelWeights {
    /// Class probabilities for an encoded message, in `classes` order
    pub fn predict_proba(&self, tokens: &[u32]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .log_priors
            .iter()
            .zip(self.log_likelihoods.iter())
            .map(|(prior, likelihoods)| {
                prior
                    + tokens
                        .iter()
                        .filter_map(|&t| {
                            likelihoods
                                .get(t as usize)
                                .or_else(|| likelihoods.get(OOV_ID as usize))
                        })
                        .sum::<f64>()
            })
            .collect();

        softmax(&scores)
    }
}

impl ArtifactBundle {
    /// Most probable tier for already-sanitized text
    pub fn predict(&self, text: &str) -> Tier {
        let probabilities = self.weights.predict_proba(&self.vocabulary.encode(text));
        probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .and_then(|(i, _)| self.weights.classes.get(i).copied())
            .unwrap_or(Tier::Benign)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / scores.len().max(1) as f64; scores.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<CorpusRow> {
        vec![
            CorpusRow::new("lunch at noon", Tier::Benign),
            CorpusRow::new("buy milk on the way home", Tier::Benign),
            CorpusRow::new("see you at the park", Tier::Benign),
            CorpusRow::new("send me your password now", Tier::Suspicious),
            CorpusRow::new("verify your account password", Tier::Suspicious),
            CorpusRow::new("bomb threat at station", Tier::Critical),
            CorpusRow::new("armed attack planned at station", Tier::Critical),
        ]
    }

    #[test]
    fn test_learns_separable_corpus() {
        let model = NaiveBayesTrainer::default().train(&rows(), &[]).unwrap();

        assert_eq!(model.bundle.predict("bomb at the station"), Tier::Critical);
        assert_eq!(model.bundle.predict("your password please"), Tier::Suspicious);
        assert_eq!(model.bundle.predict("milk and lunch"), Tier::Benign);
        assert_eq!(model.metric.evaluated_on, crate::models::EvaluationSet::Training);
        assert_eq!(model.metric.samples, 7);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = NaiveBayesTrainer::default().train(&rows(), &[]).unwrap();
        let tokens = model.bundle.vocabulary.encode("completely unseen words");
        let p = model.bundle.weights.predict_proba(&tokens);

        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn test_validation_metric_uses_held_out_rows() {
        let validation = vec![CorpusRow::new("bomb at station", Tier::Critical)];
        let model = NaiveBayesTrainer::default()
            .train(&rows(), &validation)
            .unwrap();

        assert_eq!(model.metric.evaluated_on, crate::models::EvaluationSet::Validation);
        assert_eq!(model.metric.samples, 1);
        assert_eq!(model.metric.accuracy, 1.0);
    }

    #[test]
    fn test_empty_training_set_rejected() {
        let err = NaiveBayesTrainer::default().train(&[], &[]).unwrap_err();
        assert!(matches!(err, TrainingError::EmptyTrainingSet));
    }

    #[test]
    fn test_single_class_corpus_still_trains() {
        let only_benign = vec![CorpusRow::new("hello", Tier::Benign)];
        let model = NaiveBayesTrainer::default().train(&only_benign, &[]).unwrap();
        assert_eq!(model.bundle.predict("hello"), Tier::Benign);
        assert_eq!(model.metric.accuracy, 1.0);
    }
}
