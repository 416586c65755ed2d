//! Artifact generation storage and atomic publication
//!
//! Layout under the artifacts root:
//!
//! ```text
//! CURRENT.json            pointer to the published generation
//! gen-00000007/           one directory per generation
//!     vocabulary.json
//!     weights.json
//!     manifest.json       ids, metric, row count, content checksums
//! .staging-<uuid>/        in-progress publish (debris if seen at startup)
//! ```
//!
//! Publish protocol: write staging dir → fsync → rename to `gen-<id>` → fsync
//! root → write pointer temp → fsync → rename over `CURRENT.json` → fsync root
//! → swap the in-memory generation. A crash before the pointer rename leaves
//! the previous pointer intact; leftovers are discarded by
//! [`ArtifactManager::open`]. Once the rename lands the publish is committed.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{
    ArtifactGeneration, GenerationCandidate, GenerationId, GenerationManifest, ModelWeights,
    PublishedPointer, Vocabulary, BUNDLE_FORMAT_VERSION,
};

pub const POINTER_FILE: &str = "CURRENT.json";
const VOCABULARY_FILE: &str = "vocabulary.json";
const WEIGHTS_FILE: &str = "weights.json";
const MANIFEST_FILE: &str = "manifest.json";
const STAGING_PREFIX: &str = ".staging-";
const POINTER_TEMP_PREFIX: &str = ".CURRENT.json.tmp.";

/// Publish protocol step, for crash injection in tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    WriteStaging,
    RenameGeneration,
    WritePointerTemp,
    RenamePointer,
    /// Directory fsync after the pointer swap; injecting it fails the fsync
    /// without aborting the already committed publish
    SyncPointerDir,
}

/// Owner of the artifacts directory and of the in-memory current generation
pub struct ArtifactManager {
    root: PathBuf,
    retain: usize,
    current: RwLock<Option<Arc<ArtifactGeneration>>>,
    /// Serializes publishers; holds the highest generation id ever published
    last_published: Mutex<Option<GenerationId>>,
    announce: watch::Sender<Option<GenerationId>>,
}

impl ArtifactManager {
    /// Open the artifacts root, discard crash debris and load the current generation
    ///
    /// A pointer naming an unreadable generation is logged and treated as
    /// "no generation"; its id is still never reused.
    pub fn open(root: impl Into<PathBuf>, retain: usize) -> Result<Self, PipelineError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err("create_root", &root, e))?;

        let pointer = read_pointer(&root)?;
        let pointer_id = pointer.as_ref().map(|p| p.generation_id);
        discard_debris(&root, pointer_id)?;

        let current = match &pointer {
            Some(pointer) => match load_generation(&root.join(&pointer.directory)) {
                Ok(generation) if generation.id() == pointer.generation_id => {
                    info!(generation = %generation.id(), "Loaded current artifact generation");
                    Some(Arc::new(generation))
                }
                Ok(generation) => {
                    error!(
                        pointer = %pointer.generation_id,
                        manifest = %generation.id(),
                        "Pointer and manifest disagree, ignoring current generation"
                    );
                    None
                }
                Err(e) => {
                    error!(generation = %pointer.generation_id, error = %e, "Current generation unreadable");
                    None
                }
            },
            None => {
                debug!(root = %root.display(), "No published generation yet");
                None
            }
        };

        let highest_on_disk = list_generation_dirs(&root)?.into_iter().max();
        let last_published = pointer_id.max(highest_on_disk);
        let (announce, _) = watch::channel(current.as_ref().map(|g| g.id()));

        Ok(Self {
            root,
            retain: retain.max(1),
            current: RwLock::new(current),
            last_published: Mutex::new(last_published),
            announce,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The published generation, if any
    pub fn current(&self) -> Option<Arc<ArtifactGeneration>> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn current_id(&self) -> Option<GenerationId> {
        self.current().map(|g| g.id())
    }

    /// Receives the id of every newly published generation
    pub fn subscribe(&self) -> watch::Receiver<Option<GenerationId>> {
        self.announce.subscribe()
    }

    /// Ids of the generation directories currently on disk, ascending
    pub fn list_generations(&self) -> Result<Vec<GenerationId>, PipelineError> {
        let mut ids = list_generation_dirs(&self.root)?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Publish `candidate` as the next generation
    pub fn publish(&self, candidate: &GenerationCandidate) -> Result<GenerationId, PipelineError> {
        self.publish_internal(candidate, None)
    }

    /// Publish, aborting right after `crash_after` as if the process had died
    ///
    /// Nothing is cleaned up on an injected crash, matching a real one.
    pub fn publish_with_crash_injection(
        &self,
        candidate: &GenerationCandidate,
        crash_after: PublishStep,
    ) -> Result<GenerationId, PipelineError> {
        self.publish_internal(candidate, Some(crash_after))
    }

    fn publish_internal(
        &self,
        candidate: &GenerationCandidate,
        crash_after: Option<PublishStep>,
    ) -> Result<GenerationId, PipelineError> {
        let mut last_published = self.last_published.lock().unwrap_or_else(|p| p.into_inner());
        let id = last_published.map(GenerationId::next).unwrap_or(GenerationId(1));

        let staging = self.root.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        let final_dir = self.root.join(id.dir_name());

        let generation = match self.write_staging(&staging, id, candidate) {
            Ok(generation) => generation,
            Err(e) => {
                remove_dir_best_effort(&staging);
                return Err(e);
            }
        };
        maybe_crash(crash_after, PublishStep::WriteStaging)?;

        if let Err(e) = fs::rename(&staging, &final_dir) {
            remove_dir_best_effort(&staging);
            return Err(io_err("rename_generation", &final_dir, e));
        }
        // The id is burned from here on, even if the pointer write fails
        *last_published = Some(id);
        sync_directory(&self.root)?;
        maybe_crash(crash_after, PublishStep::RenameGeneration)?;

        let pointer = PublishedPointer {
            generation_id: id,
            directory: id.dir_name(),
            published_at: Utc::now(),
        };
        let pointer_path = self.root.join(POINTER_FILE);
        let temp_path = self
            .root
            .join(format!("{POINTER_TEMP_PREFIX}{}", Uuid::new_v4()));

        if let Err(e) = write_synced(&temp_path, &to_json(&pointer)?) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        maybe_crash(crash_after, PublishStep::WritePointerTemp)?;

        if let Err(e) = fs::rename(&temp_path, &pointer_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err("rename_pointer", &pointer_path, e));
        }
        maybe_crash(crash_after, PublishStep::RenamePointer)?;

        // The pointer names the new generation now; from here on the publish is committed
        let dir_synced = sync_directory(&self.root)
            .and_then(|()| maybe_crash(crash_after, PublishStep::SyncPointerDir));
        if let Err(e) = dir_synced {
            warn!(generation = %id, error = %e, "Pointer directory fsync failed after commit");
        }

        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(generation));
        self.announce.send_replace(Some(id));

        info!(
            generation = %id,
            rows = candidate.trained_row_count,
            accuracy = candidate.metric.accuracy,
            "Published artifact generation"
        );

        self.prune(id);
        Ok(id)
    }

    fn write_staging(
        &self,
        staging: &Path,
        id: GenerationId,
        candidate: &GenerationCandidate,
    ) -> Result<ArtifactGeneration, PipelineError> {
        candidate
            .bundle
            .weights
            .check_shape()
            .map_err(PipelineError::PublishFailed)?;
        fs::create_dir(staging).map_err(|e| io_err("create_staging", staging, e))?;

        let vocabulary_bytes = to_json(&candidate.bundle.vocabulary)?;
        let weights_bytes = to_json(&candidate.bundle.weights)?;

        let manifest = GenerationManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            generation_id: id,
            created_at: Utc::now(),
            trainer: candidate.trainer.clone(),
            trained_row_count: candidate.trained_row_count,
            metric: candidate.metric,
            vocabulary_sha256: sha256_hex(&vocabulary_bytes),
            weights_sha256: sha256_hex(&weights_bytes),
        };

        write_synced(&staging.join(VOCABULARY_FILE), &vocabulary_bytes)?;
        write_synced(&staging.join(WEIGHTS_FILE), &weights_bytes)?;
        write_synced(&staging.join(MANIFEST_FILE), &to_json(&manifest)?)?;
        sync_directory(staging)?;

        Ok(ArtifactGeneration {
            manifest,
            vocabulary: candidate.bundle.vocabulary.clone(),
            weights: candidate.bundle.weights.clone(),
        })
    }

    /// Remove generations beyond the retention window; never the current one
    fn prune(&self, current: GenerationId) {
        let mut ids = match list_generation_dirs(&self.root) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Could not list generations for pruning");
                return;
            }
        };
        ids.sort_unstable_by(|a, b| b.cmp(a));

        for id in ids.into_iter().skip(self.retain) {
            if id == current {
                continue;
            }
            let dir = self.root.join(id.dir_name());
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!(generation = %id, "Pruned old generation"),
                Err(e) => warn!(generation = %id, error = %e, "Failed to prune old generation"),
            }
        }
    }
}

/// Read the published pointer under `root`; `None` if nothing was published
pub fn read_pointer(root: &Path) -> Result<Option<PublishedPointer>, PipelineError> {
    let path = root.join(POINTER_FILE);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PipelineError::PublishFailed(format!("corrupt pointer {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err("read_pointer", &path, e)),
    }
}

/// Load and verify the generation stored in `dir`
pub fn load_generation(dir: &Path) -> Result<ArtifactGeneration, PipelineError> {
    let manifest: GenerationManifest = read_json(&dir.join(MANIFEST_FILE))?;
    if manifest.format_version != BUNDLE_FORMAT_VERSION {
        return Err(PipelineError::PublishFailed(format!(
            "unsupported bundle format {} in {}",
            manifest.format_version,
            dir.display()
        )));
    }

    let vocabulary_bytes = read_bytes(&dir.join(VOCABULARY_FILE))?;
    let weights_bytes = read_bytes(&dir.join(WEIGHTS_FILE))?;
    if sha256_hex(&vocabulary_bytes) != manifest.vocabulary_sha256
        || sha256_hex(&weights_bytes) != manifest.weights_sha256
    {
        return Err(PipelineError::PublishFailed(format!(
            "checksum mismatch in {}",
            dir.display()
        )));
    }

    let vocabulary: Vocabulary = parse_json(&vocabulary_bytes, &dir.join(VOCABULARY_FILE))?;
    let weights: ModelWeights = parse_json(&weights_bytes, &dir.join(WEIGHTS_FILE))?;
    weights
        .check_shape()
        .map_err(|e| PipelineError::PublishFailed(format!("{}: {e}", dir.display())))?;

    Ok(ArtifactGeneration {
        manifest,
        vocabulary,
        weights,
    })
}

fn list_generation_dirs(root: &Path) -> Result<Vec<GenerationId>, PipelineError> {
    let entries = fs::read_dir(root).map_err(|e| io_err("list", root, e))?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| GenerationId::from_dir_name(&entry.file_name().to_string_lossy()))
        .collect())
}

/// Remove staging dirs, pointer temp files and unpublished generation dirs
fn discard_debris(root: &Path, pointer_id: Option<GenerationId>) -> Result<(), PipelineError> {
    let entries = fs::read_dir(root).map_err(|e| io_err("list", root, e))?;

    for entry in entries.filter_map(|entry| entry.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        let unpublished = GenerationId::from_dir_name(&name)
            .is_some_and(|id| pointer_id.map_or(true, |current| id > current));

        if name.starts_with(STAGING_PREFIX) || unpublished {
            warn!(path = %path.display(), "Discarding unpublished artifact debris");
            remove_dir_best_effort(&path);
        } else if name.starts_with(POINTER_TEMP_PREFIX) {
            warn!(path = %path.display(), "Discarding stale pointer temp file");
            let _ = fs::remove_file(&path);
        }
    }

    Ok(())
}

fn maybe_crash(crash_after: Option<PublishStep>, step: PublishStep) -> Result<(), PipelineError> {
    if crash_after == Some(step) {
        return Err(PipelineError::PublishFailed(format!(
            "crash injected after {step:?}"
        )));
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let mut file = File::create(path).map_err(|e| io_err("create", path, e))?;
    file.write_all(bytes).map_err(|e| io_err("write", path, e))?;
    file.sync_all().map_err(|e| io_err("fsync", path, e))
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<(), PipelineError> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| io_err("fsync_dir", dir, e))
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<(), PipelineError> {
    Ok(())
}

fn remove_dir_best_effort(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove directory");
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec(value).map_err(|e| PipelineError::PublishFailed(e.to_string()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, PipelineError> {
    fs::read(path).map_err(|e| io_err("read", path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    parse_json(&read_bytes(path)?, path)
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T, PipelineError> {
    serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::PublishFailed(format!("parse {}: {e}", path.display())))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn io_err(step: &str, path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::PublishFailed(format!("{step} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorpusRow, EvaluationSet, Tier, ValidationMetric};
    use crate::services::naive_bayes::NaiveBayesTrainer;
    use crate::services::trainer::ModelTrainer;
    use tempfile::TempDir;

    fn candidate(rows: usize) -> GenerationCandidate {
        let corpus = vec![
            CorpusRow::new("buy milk", Tier::Benign),
            CorpusRow::new("bomb threat at station", Tier::Critical),
        ];
        let model = NaiveBayesTrainer::default().train(&corpus, &[]).unwrap();
        GenerationCandidate {
            bundle: model.bundle,
            metric: ValidationMetric {
                accuracy: 1.0,
                samples: 2,
                evaluated_on: EvaluationSet::Training,
            },
            trained_row_count: rows,
            trainer: "naive_bayes".to_string(),
        }
    }

    #[test]
    fn test_open_empty_root_has_no_generation() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        assert!(manager.current().is_none());
        assert!(read_pointer(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_publish_and_reopen() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();

        let first = manager.publish(&candidate(2)).unwrap();
        let second = manager.publish(&candidate(5)).unwrap();
        assert!(second > first);
        assert_eq!(manager.current_id(), Some(second));

        let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
        let current = reopened.current().unwrap();
        assert_eq!(current.id(), second);
        assert_eq!(current.manifest.trained_row_count, 5);
    }

    #[test]
    fn test_subscribers_see_new_generation() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        let mut rx = manager.subscribe();
        assert!(!rx.has_changed().unwrap());

        let id = manager.publish(&candidate(2)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(id));
    }

    #[test]
    fn test_failed_pointer_dir_sync_still_commits() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        manager.publish(&candidate(2)).unwrap();
        let mut rx = manager.subscribe();

        let id = manager
            .publish_with_crash_injection(&candidate(4), PublishStep::SyncPointerDir)
            .unwrap();

        assert_eq!(id, GenerationId(2));
        assert_eq!(manager.current_id(), Some(id));
        assert_eq!(*rx.borrow_and_update(), Some(id));
        assert_eq!(read_pointer(dir.path()).unwrap().unwrap().generation_id, id);

        let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
        assert_eq!(reopened.current_id(), Some(id));
    }

    #[test]
    fn test_misshapen_weights_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        let id = manager.publish(&candidate(2)).unwrap();
        let gen_dir = dir.path().join(id.dir_name());

        // Consistent checksum, inconsistent shape
        let mut weights: ModelWeights = read_json(&gen_dir.join(WEIGHTS_FILE)).unwrap();
        weights.log_priors.pop();
        let bytes = to_json(&weights).unwrap();
        fs::write(gen_dir.join(WEIGHTS_FILE), &bytes).unwrap();
        let mut manifest: GenerationManifest = read_json(&gen_dir.join(MANIFEST_FILE)).unwrap();
        manifest.weights_sha256 = sha256_hex(&bytes);
        fs::write(gen_dir.join(MANIFEST_FILE), to_json(&manifest).unwrap()).unwrap();

        assert!(load_generation(&gen_dir).is_err());
        let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
        assert!(reopened.current().is_none());
    }

    #[test]
    fn test_misshapen_candidate_never_published() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        let mut bad = candidate(2);
        bad.bundle.weights.log_likelihoods.clear();

        assert!(manager.publish(&bad).is_err());
        assert!(manager.current().is_none());
        assert!(manager.list_generations().unwrap().is_empty());
    }

    #[test]
    fn test_tampered_generation_fails_verification() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        let id = manager.publish(&candidate(2)).unwrap();

        let weights = dir.path().join(id.dir_name()).join(WEIGHTS_FILE);
        fs::write(&weights, b"{}").unwrap();

        assert!(load_generation(&dir.path().join(id.dir_name())).is_err());
    }
}
