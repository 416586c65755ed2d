//! Train/validation splitter
//!
//! Seeded Fisher-Yates shuffle, so the same corpus and seed always produce the
//! same partition.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `samples` with `seed` and split off `ceil(len * validation_ratio)`
/// rows for validation
///
/// At least one row always stays in the training set. Corpora of zero or one
/// rows produce an empty validation set.
pub fn split_train_validation<T>(
    mut samples: Vec<T>,
    validation_ratio: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    let total = samples.len();
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let wanted = ((total as f64) * validation_ratio.clamp(0.0, 1.0)).ceil() as usize;
    let val_len = wanted.min(total.saturating_sub(1));
    let val = samples.split_off(total - val_len);

    tracing::debug!(train = samples.len(), validation = val.len(), "Dataset split");

    (samples, val)
}
