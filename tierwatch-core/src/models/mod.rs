//! Data models for the tierwatch orchestrator
//!
//! - Labeled records and corpus rows
//! - Training run state machine
//! - Artifact generations and predictions

pub mod artifact;
pub mod prediction;
pub mod record;
pub mod training_session;

pub use artifact::{
    ArtifactBundle, ArtifactGeneration, EvaluationSet, GenerationCandidate, GenerationId,
    GenerationManifest, ModelWeights, PublishedPointer, ValidationMetric, Vocabulary,
    BUNDLE_FORMAT_VERSION,
};
pub use prediction::{Analysis, Classification, Entity, EntityKind};
pub use record::{CorpusRow, RecordId, RemoteRecord, Tier};
pub use training_session::{
    RetrainOutcome, RunOutcome, RunSummary, StateTransition, TrainingState, TrainingStatus,
};
