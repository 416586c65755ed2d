//! Training coordinator
//!
//! Single-run gate and lifecycle state machine:
//!
//! ```text
//! IDLE → LOCKED → TRAINING → PUBLISHING → IDLE
//!          └────────┴───────────┴──→ FAILED → IDLE
//! ```
//!
//! A retrain request takes the on-disk lock token and returns at once; the run
//! itself executes on a spawned task. Records are reported as trained only
//! after their rows are in the corpus and a generation built from that corpus
//! has been published. The lock is released on every exit path, including a
//! panicking trainer.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use tierwatch_common::config::TrainingConfig;

use crate::error::PipelineError;
use crate::models::{
    GenerationCandidate, GenerationId, RetrainOutcome, RunOutcome, RunSummary, StateTransition,
    TrainingState, TrainingStatus, ValidationMetric,
};
use crate::services::artifact_manager::ArtifactManager;
use crate::services::corpus_store::LocalCorpusStore;
use crate::services::lock_token::{LockFile, LockGuard};
use crate::services::record_source::RecordSource;
use crate::services::splitter::split_train_validation;
use crate::services::synchronizer::Synchronizer;
use crate::services::trainer::{ModelTrainer, TrainingError};

/// Transitions kept for status reporting
const TRANSITION_HISTORY: usize = 32;

/// Run parameters
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub seed: u64,
    pub validation_ratio: f64,
    pub lock_stale_after: Duration,
    pub lock_heartbeat: Duration,
}

impl From<&TrainingConfig> for CoordinatorSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            seed: config.seed,
            validation_ratio: config.validation_ratio,
            lock_stale_after: Duration::from_secs(config.lock_stale_after_secs),
            lock_heartbeat: Duration::from_secs(config.lock_heartbeat_secs),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

#[derive(Debug)]
struct RunStatus {
    run_id: Option<Uuid>,
    run_started_at: Option<DateTime<Utc>>,
    current_generation: Option<GenerationId>,
    last_metric: Option<ValidationMetric>,
    trained_row_count: usize,
    last_outcome: Option<RunOutcome>,
    transitions: VecDeque<StateTransition>,
}

pub struct TrainingCoordinator {
    synchronizer: Synchronizer,
    source: Arc<dyn RecordSource>,
    trainer: Arc<dyn ModelTrainer>,
    artifacts: Arc<ArtifactManager>,
    lock: LockFile,
    settings: CoordinatorSettings,
    /// Serializes the check-and-acquire step of retrain requests
    gate: Mutex<()>,
    status: RwLock<RunStatus>,
    state: watch::Sender<TrainingState>,
}

impl TrainingCoordinator {
    /// Build the coordinator, removing a lock left by a crashed run
    ///
    /// No run of this process can hold the lock yet, so a marker carrying our
    /// own pid is reclaimed too.
    pub fn new(
        source: Arc<dyn RecordSource>,
        corpus: LocalCorpusStore,
        trainer: Arc<dyn ModelTrainer>,
        artifacts: Arc<ArtifactManager>,
        lock_path: impl Into<std::path::PathBuf>,
        settings: CoordinatorSettings,
    ) -> Result<Arc<Self>, PipelineError> {
        let lock = LockFile::new(lock_path, settings.lock_stale_after);
        if lock.recover_orphaned()? {
            warn!("Recovered training lock left by a crashed run");
        }

        let current = artifacts.current();
        let status = RunStatus {
            run_id: None,
            run_started_at: None,
            current_generation: current.as_ref().map(|g| g.id()),
            last_metric: current.as_ref().map(|g| g.manifest.metric),
            trained_row_count: current
                .as_ref()
                .map(|g| g.manifest.trained_row_count)
                .unwrap_or(0),
            last_outcome: None,
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
        };
        let (state, _) = watch::channel(TrainingState::Idle);

        Ok(Arc::new(Self {
            synchronizer: Synchronizer::new(Arc::clone(&source), corpus),
            source,
            trainer,
            artifacts,
            lock,
            settings,
            gate: Mutex::new(()),
            status: RwLock::new(status),
            state,
        }))
    }

    pub fn artifacts(&self) -> &Arc<ArtifactManager> {
        &self.artifacts
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn state(&self) -> TrainingState {
        *self.state.borrow()
    }

    /// Start a run unless one is already active (here or in another process)
    pub async fn request_retrain(self: &Arc<Self>) -> Result<RetrainOutcome, PipelineError> {
        let _gate = self.gate.lock().await;

        if self.state().is_running() {
            info!("Retrain requested while a run is active");
            return Ok(RetrainOutcome::AlreadyRunning);
        }

        let Some(mut guard) = self.lock.try_acquire()? else {
            info!(path = %self.lock.path().display(), "Training lock held elsewhere");
            return Ok(RetrainOutcome::AlreadyRunning);
        };
        guard.start_heartbeat(self.settings.lock_heartbeat);

        let run_id = Uuid::new_v4();
        {
            let mut status = self.status.write().await;
            status.run_id = Some(run_id);
            status.run_started_at = Some(Utc::now());
        }
        self.transition(run_id, TrainingState::Locked).await;

        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(run_id, guard).await });

        Ok(RetrainOutcome::Started { run_id })
    }

    /// Status snapshot; a record source error only blanks the pending count
    pub async fn get_status(&self) -> TrainingStatus {
        let pending_remote_count = match self.source.count_untrained().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Could not count pending records");
                None
            }
        };

        let status = self.status.read().await;
        TrainingStatus {
            state: self.state(),
            run_id: status.run_id,
            run_started_at: status.run_started_at,
            current_generation: status.current_generation,
            last_metric: status.last_metric,
            trained_row_count: status.trained_row_count,
            pending_remote_count,
            last_outcome: status.last_outcome.clone(),
            recent_transitions: status.transitions.iter().cloned().collect(),
        }
    }

    /// Resolve once no run is active
    pub async fn wait_for_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == TrainingState::Idle).await;
    }

    /// Request a retrain every `period`; runs until the handle is aborted
    pub fn spawn_scheduler(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match coordinator.request_retrain().await {
                    Ok(outcome) => info!(?outcome, "Scheduled retrain"),
                    Err(e) => warn!(error = %e, "Scheduled retrain could not start"),
                }
            }
        })
    }

    async fn run(self: Arc<Self>, run_id: Uuid, guard: LockGuard) {
        let worker = Arc::clone(&self);
        let result = tokio::spawn(async move { worker.execute(run_id).await })
            .await
            .unwrap_or_else(|e| {
                Err(PipelineError::TrainingFailed(TrainingError::Internal(format!(
                    "run task aborted: {e}"
                ))))
            });

        let outcome = match result {
            Ok(summary) => {
                info!(
                    %run_id,
                    generation = %summary.generation_id,
                    rows = summary.trained_row_count,
                    accuracy = summary.metric.accuracy,
                    "Training run succeeded"
                );
                self.release(guard);
                RunOutcome::Succeeded {
                    run_id,
                    finished_at: Utc::now(),
                    summary,
                }
            }
            Err(e) => {
                error!(%run_id, reason = e.reason(), error = %e, "Training run failed");
                self.transition(run_id, TrainingState::Failed).await;
                self.release(guard);
                RunOutcome::Failed {
                    run_id,
                    finished_at: Utc::now(),
                    reason: e.reason().to_string(),
                    message: e.to_string(),
                }
            }
        };

        // Outcome lands before IDLE so waiters never observe a stale one
        self.status.write().await.last_outcome = Some(outcome);
        self.transition(run_id, TrainingState::Idle).await;
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunSummary, PipelineError> {
        self.transition(run_id, TrainingState::Training).await;

        let report = self.synchronizer.sync_report().await?;

        let corpus = self.synchronizer.corpus().clone();
        let rows = tokio::task::spawn_blocking(move || corpus.load_rows())
            .await
            .map_err(|e| PipelineError::Corpus(e.to_string()))??;
        if rows.is_empty() {
            return Err(PipelineError::DataEmpty);
        }
        let trained_row_count = rows.len();

        let (train_set, validation_set) =
            split_train_validation(rows, self.settings.validation_ratio, self.settings.seed);
        info!(
            %run_id,
            train = train_set.len(),
            validation = validation_set.len(),
            trainer = self.trainer.name(),
            "Training started"
        );

        let trainer = Arc::clone(&self.trainer);
        let trained = tokio::task::spawn_blocking(move || trainer.train(&train_set, &validation_set))
            .await
            .map_err(|e| TrainingError::Internal(format!("trainer panicked: {e}")))??;

        self.transition(run_id, TrainingState::Publishing).await;

        let candidate = GenerationCandidate {
            bundle: trained.bundle,
            metric: trained.metric,
            trained_row_count,
            trainer: self.trainer.name().to_string(),
        };
        let artifacts = Arc::clone(&self.artifacts);
        let generation_id = tokio::task::spawn_blocking(move || artifacts.publish(&candidate))
            .await
            .map_err(|e| PipelineError::PublishFailed(e.to_string()))??;

        {
            let mut status = self.status.write().await;
            status.current_generation = Some(generation_id);
            status.last_metric = Some(trained.metric);
            status.trained_row_count = trained_row_count;
        }

        let consumed = report.consumed();
        let bookkeeping_error = if consumed.is_empty() {
            None
        } else {
            match self.source.mark_trained(&consumed).await {
                Ok(()) => None,
                Err(e) => {
                    let e = PipelineError::BookkeepingFailed(e.to_string());
                    warn!(%run_id, records = consumed.len(), error = %e, "Published, but records not marked trained");
                    Some(e.to_string())
                }
            }
        };

        Ok(RunSummary {
            generation_id,
            metric: trained.metric,
            trained_row_count,
            appended: report.appended,
            marked: if bookkeeping_error.is_none() {
                consumed
            } else {
                Vec::new()
            },
            bookkeeping_error,
        })
    }

    fn release(&self, guard: LockGuard) {
        if let Err(e) = guard.release() {
            warn!(error = %e, "Failed to release training lock");
        }
    }

    async fn transition(&self, run_id: Uuid, next: TrainingState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            error!(?current, ?next, "Invalid training state transition ignored");
            return;
        }

        let transition = StateTransition {
            run_id,
            old_state: current,
            new_state: next,
            transitioned_at: Utc::now(),
        };
        {
            let mut status = self.status.write().await;
            if status.transitions.len() == TRANSITION_HISTORY {
                status.transitions.pop_front();
            }
            status.transitions.push_back(transition);
        }
        self.state.send_replace(next);

        info!(%run_id, from = ?current, to = ?next, "Training state transition");
    }
}
