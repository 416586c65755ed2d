//! Service modules for the corpus sync and model lifecycle pipeline
//!
//! Leaf-first: sanitizer → corpus store → synchronizer → trainer →
//! artifact manager → training coordinator, with the inference gateway
//! reading whatever the artifact manager last published.

pub mod artifact_manager;
pub mod corpus_store;
pub mod entity_extractor;
pub mod inference_gateway;
pub mod lock_token;
pub mod naive_bayes;
pub mod record_source;
pub mod sanitizer;
pub mod splitter;
pub mod synchronizer;
pub mod tokenizer;
pub mod trainer;
pub mod training_coordinator;

pub use artifact_manager::{ArtifactManager, PublishStep};
pub use corpus_store::LocalCorpusStore;
pub use inference_gateway::InferenceGateway;
pub use lock_token::{LockFile, LockGuard, LockState, LockToken};
pub use naive_bayes::NaiveBayesTrainer;
pub use record_source::RecordSource;
pub use synchronizer::{SyncReport, Synchronizer};
pub use trainer::{ModelTrainer, TrainedModel, TrainingError};
pub use training_coordinator::{CoordinatorSettings, TrainingCoordinator};
