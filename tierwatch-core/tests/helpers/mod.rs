//! Test Helper Utilities
//!
//! Shared fixtures for tierwatch-core integration tests: an in-memory record
//! source with failure switches, trainers that fail or block on demand, and a
//! temp-dir backed coordinator environment.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tempfile::TempDir;

use tierwatch_common::{Error, Result};
use tierwatch_core::models::{CorpusRow, GenerationId, RecordId, RemoteRecord};
use tierwatch_core::services::artifact_manager::read_pointer;
use tierwatch_core::services::{
    ArtifactManager, CoordinatorSettings, LocalCorpusStore, ModelTrainer, NaiveBayesTrainer,
    RecordSource, TrainedModel, TrainingCoordinator, TrainingError,
};

/// In-memory record source
#[derive(Default)]
pub struct MemoryRecordSource {
    records: Mutex<Vec<RemoteRecord>>,
    pub fail_fetch: AtomicBool,
    pub fail_mark: AtomicBool,
    pub fail_count: AtomicBool,
    /// Return trained rows from `fetch_untrained` too, like a source with a broken filter
    pub include_trained: AtomicBool,
    /// Every successful `mark_trained` call, in order
    pub mark_calls: Mutex<Vec<Vec<RecordId>>>,
    /// Published pointer observed on disk at each `mark_trained` call
    pub pointer_at_mark: Mutex<Vec<Option<GenerationId>>>,
    artifacts_dir: Mutex<Option<PathBuf>>,
}

impl MemoryRecordSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, text: &str, label: &str) -> RecordId {
        let mut records = self.records.lock().unwrap();
        let id = RecordId(records.len() as i64 + 1);
        records.push(RemoteRecord {
            id,
            text: text.to_string(),
            label: label.to_string(),
            trained: None,
            checked: None,
        });
        id
    }

    pub fn trained(&self, id: RecordId) -> Option<bool> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.trained)
    }

    pub fn set_trained(&self, id: RecordId, trained: Option<bool>) {
        if let Some(record) = self.records.lock().unwrap().iter_mut().find(|r| r.id == id) {
            record.trained = trained;
        }
    }

    pub fn watch_pointer(&self, artifacts_dir: PathBuf) {
        *self.artifacts_dir.lock().unwrap() = Some(artifacts_dir);
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_untrained(&self) -> Result<Vec<RemoteRecord>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Internal("connection refused".to_string()));
        }
        let include_trained = self.include_trained.load(Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| include_trained || r.trained != Some(true))
            .cloned()
            .collect())
    }

    async fn mark_trained(&self, ids: &[RecordId]) -> Result<()> {
        let pointer = self
            .artifacts_dir
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|dir| read_pointer(dir).unwrap())
            .map(|p| p.generation_id);
        self.pointer_at_mark.lock().unwrap().push(pointer);

        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(Error::Internal("database is read-only".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut().filter(|r| ids.contains(&r.id)) {
            record.trained = Some(true);
            record.checked = Some(true);
        }
        self.mark_calls.lock().unwrap().push(ids.to_vec());
        Ok(())
    }

    async fn count_untrained(&self) -> Result<u64> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(Error::Internal("connection refused".to_string()));
        }
        Ok(self.fetch_untrained().await?.len() as u64)
    }
}

/// Trainer that always fails
pub struct FailingTrainer;

impl ModelTrainer for FailingTrainer {
    fn name(&self) -> &str {
        "failing"
    }

    fn train(&self, _: &[CorpusRow], _: &[CorpusRow]) -> std::result::Result<TrainedModel, TrainingError> {
        Err(TrainingError::Internal("loss diverged".to_string()))
    }
}

/// Trainer that panics mid-run
pub struct PanickingTrainer;

impl ModelTrainer for PanickingTrainer {
    fn name(&self) -> &str {
        "panicking"
    }

    fn train(&self, _: &[CorpusRow], _: &[CorpusRow]) -> std::result::Result<TrainedModel, TrainingError> {
        panic!("trainer bug");
    }
}

/// Trainer that waits for `release()` before delegating to naive Bayes
pub struct BlockingTrainer {
    gate: Mutex<mpsc::Receiver<()>>,
    inner: NaiveBayesTrainer,
}

impl BlockingTrainer {
    pub fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(rx),
                inner: NaiveBayesTrainer::default(),
            }),
            tx,
        )
    }
}

impl ModelTrainer for BlockingTrainer {
    fn name(&self) -> &str {
        "blocking"
    }

    fn train(
        &self,
        train_set: &[CorpusRow],
        validation_set: &[CorpusRow],
    ) -> std::result::Result<TrainedModel, TrainingError> {
        let _ = self.gate.lock().unwrap().recv();
        self.inner.train(train_set, validation_set)
    }
}

/// Temp data root with a coordinator wired to an in-memory source
pub struct TestEnv {
    pub dir: TempDir,
    pub source: Arc<MemoryRecordSource>,
    pub coordinator: Arc<TrainingCoordinator>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_trainer(Arc::new(NaiveBayesTrainer::default()))
    }

    pub fn with_trainer(trainer: Arc<dyn ModelTrainer>) -> Self {
        let dir = TempDir::new().unwrap();
        let source = MemoryRecordSource::new();
        let coordinator = build_coordinator(&dir, Arc::clone(&source), trainer);
        Self {
            dir,
            source,
            coordinator,
        }
    }

    /// Fresh coordinator over the same data root, as after a process restart
    pub fn restart(&mut self, trainer: Arc<dyn ModelTrainer>) {
        self.coordinator = build_coordinator(&self.dir, Arc::clone(&self.source), trainer);
    }

    pub fn corpus(&self) -> LocalCorpusStore {
        LocalCorpusStore::new(self.corpus_path())
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.dir.path().join("corpus.csv")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("training.lock")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }
}

pub fn build_coordinator(
    dir: &TempDir,
    source: Arc<MemoryRecordSource>,
    trainer: Arc<dyn ModelTrainer>,
) -> Arc<TrainingCoordinator> {
    let artifacts_dir = dir.path().join("artifacts");
    source.watch_pointer(artifacts_dir.clone());
    let artifacts = Arc::new(ArtifactManager::open(artifacts_dir, 3).unwrap());
    TrainingCoordinator::new(
        source,
        LocalCorpusStore::new(dir.path().join("corpus.csv")),
        trainer,
        artifacts,
        dir.path().join("training.lock"),
        CoordinatorSettings::default(),
    )
    .unwrap()
}
