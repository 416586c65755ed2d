//! Labeled records and corpus rows

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tier assigned to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Benign,
    Suspicious,
    Critical,
}

impl Tier {
    /// All tiers in class-index order
    pub const ALL: [Tier; 3] = [Tier::Benign, Tier::Suspicious, Tier::Critical];

    /// Parse a stored label; tolerant of case and surrounding whitespace
    pub fn from_label(label: &str) -> Option<Tier> {
        match label.trim().to_ascii_lowercase().as_str() {
            "benign" => Some(Tier::Benign),
            "suspicious" => Some(Tier::Suspicious),
            "critical" => Some(Tier::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Benign => "benign",
            Tier::Suspicious => "suspicious",
            Tier::Critical => "critical",
        }
    }

    /// Class index used by model weights
    pub fn index(&self) -> usize {
        match self {
            Tier::Benign => 0,
            Tier::Suspicious => 1,
            Tier::Critical => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a row in the remote record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Labeled record as held by the remote store
///
/// `label` is kept raw: the synchronizer decides whether it names a known tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub text: String,
    pub label: String,
    /// NULL and false both mean "not yet consumed"
    pub trained: Option<bool>,
    pub checked: Option<bool>,
}

impl RemoteRecord {
    /// Eligible for consumption: not yet trained and labeled with a known tier
    pub fn is_eligible(&self) -> bool {
        self.trained != Some(true) && Tier::from_label(&self.label).is_some()
    }
}

/// Row of the local training corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRow {
    /// Sanitized text
    pub text: String,
    pub label: Tier,
}

impl CorpusRow {
    pub fn new(text: impl Into<String>, label: Tier) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}
