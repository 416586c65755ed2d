//! Training run state machine
//!
//! IDLE → LOCKED → TRAINING → PUBLISHING → IDLE, with FAILED → IDLE reachable
//! from every non-idle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{GenerationId, ValidationMetric};
use super::record::RecordId;

/// Training coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrainingState {
    /// No run in progress
    Idle,
    /// Lock token held, run about to start
    Locked,
    /// Syncing the corpus and running the trainer
    Training,
    /// Writing and publishing the new generation
    Publishing,
    /// Run aborted; lock released on the way back to idle
    Failed,
}

impl TrainingState {
    /// Whether `self → next` is an edge of the state machine
    pub fn can_transition_to(self, next: TrainingState) -> bool {
        use TrainingState::*;
        matches!(
            (self, next),
            (Idle, Locked)
                | (Locked, Training)
                | (Training, Publishing)
                | (Publishing, Idle)
                | (Locked, Failed)
                | (Training, Failed)
                | (Publishing, Failed)
                | (Failed, Idle)
        )
    }

    pub fn is_running(self) -> bool {
        !matches!(self, TrainingState::Idle)
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: TrainingState,
    pub new_state: TrainingState,
    pub transitioned_at: DateTime<Utc>,
}

/// What a finished run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generation_id: GenerationId,
    pub metric: ValidationMetric,
    pub trained_row_count: usize,
    /// Ids whose rows were appended to the corpus by this run
    pub appended: Vec<RecordId>,
    /// Ids reported to the record source as trained
    pub marked: Vec<RecordId>,
    /// Set when the record source rejected `mark_trained`
    pub bookkeeping_error: Option<String>,
}

/// Outcome of the last finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded {
        run_id: Uuid,
        finished_at: DateTime<Utc>,
        summary: RunSummary,
    },
    Failed {
        run_id: Uuid,
        finished_at: DateTime<Utc>,
        /// Error category (`data_empty`, `training_failed`, ...)
        reason: String,
        message: String,
    },
}

/// Answer to a retrain request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrainOutcome {
    Started { run_id: Uuid },
    AlreadyRunning,
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub state: TrainingState,
    pub run_id: Option<Uuid>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub current_generation: Option<GenerationId>,
    pub last_metric: Option<ValidationMetric>,
    pub trained_row_count: usize,
    /// None when the record source could not be queried
    pub pending_remote_count: Option<u64>,
    pub last_outcome: Option<RunOutcome>,
    pub recent_transitions: Vec<StateTransition>,
}
