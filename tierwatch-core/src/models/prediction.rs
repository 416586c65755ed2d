//! Inference results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::artifact::GenerationId;
use super::record::Tier;

/// Classifier answer for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Tier,
    /// Probability of `label`, in `[0, 1]`
    pub confidence: f64,
    pub probabilities: BTreeMap<Tier, f64>,
    /// Generation that produced this answer
    pub generation_id: GenerationId,
}

/// Kind of rule-based entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Email,
    Url,
    IpAddress,
    PhoneNumber,
    MoneyAmount,
    TimeOfDay,
}

/// Entity span within the original text (byte offsets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Classification plus extracted entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub classification: Classification,
    pub entities: Vec<Entity>,
}
