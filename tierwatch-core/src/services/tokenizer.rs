//! Word tokenizer and vocabulary fitting

use std::collections::{BTreeMap, HashMap};

use crate::models::Vocabulary;

/// Token id reserved for padding
pub const PAD_ID: u32 = 0;
/// Token id for out-of-vocabulary words
pub const OOV_ID: u32 = 1;
pub const OOV_TOKEN: &str = "<OOV>";

/// Lowercased alphanumeric words of `text`
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

impl Vocabulary {
    /// Build a word index from `texts`, keeping the `max_words` most frequent words
    ///
    /// Ties are broken alphabetically so the same corpus always yields the same ids.
    pub fn fit<'a>(
        texts: impl IntoIterator<Item = &'a str>,
        max_words: usize,
        max_sequence_len: usize,
    ) -> Self {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for text in texts {
            for word in words(text) {
                *counts.entry(word).or_insert(0) += 1;
            }
        }
        counts.remove(OOV_TOKEN);

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_words);

        let mut word_index = BTreeMap::new();
        word_index.insert(OOV_TOKEN.to_string(), OOV_ID);
        for (rank, (word, _)) in ranked.into_iter().enumerate() {
            word_index.insert(word, OOV_ID + 1 + rank as u32);
        }

        Self {
            oov_token: OOV_TOKEN.to_string(),
            max_sequence_len,
            word_index,
        }
    }

    /// Number of token ids, padding included
    pub fn size(&self) -> usize {
        self.word_index.values().copied().max().unwrap_or(OOV_ID) as usize + 1
    }

    /// Token ids of `text`, truncated to `max_sequence_len`
    pub fn encode(&self, text: &str) -> Vec<u32> {
        words(text)
            .take(self.max_sequence_len)
            .map(|w| self.word_index.get(&w).copied().unwrap_or(OOV_ID))
            .collect()
    }
}
