//! Artifact publication integration tests
//!
//! Crash injection at every publish step, retention and concurrent readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use tierwatch_core::models::{CorpusRow, GenerationCandidate, GenerationId, Tier};
use tierwatch_core::services::artifact_manager::{load_generation, read_pointer, POINTER_FILE};
use tierwatch_core::services::{ArtifactManager, ModelTrainer, NaiveBayesTrainer, PublishStep};

fn candidate() -> GenerationCandidate {
    let rows = vec![
        CorpusRow::new("buy milk on the way home", Tier::Benign),
        CorpusRow::new("send me your bank password", Tier::Suspicious),
        CorpusRow::new("bomb threat at the station", Tier::Critical),
    ];
    let model = NaiveBayesTrainer::default().train(&rows, &[]).unwrap();
    GenerationCandidate {
        bundle: model.bundle,
        metric: model.metric,
        trained_row_count: rows.len(),
        trainer: "naive_bayes".to_string(),
    }
}

fn entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_crash_before_pointer_swap_keeps_previous_generation() {
    for step in [
        PublishStep::WriteStaging,
        PublishStep::RenameGeneration,
        PublishStep::WritePointerTemp,
    ] {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::open(dir.path(), 3).unwrap();
        manager.publish(&candidate()).unwrap();

        let result = manager.publish_with_crash_injection(&candidate(), step);
        assert!(result.is_err(), "{step:?}");
        assert_eq!(manager.current_id(), Some(GenerationId(1)), "{step:?}");
        assert_eq!(
            read_pointer(dir.path()).unwrap().unwrap().generation_id,
            GenerationId(1),
            "{step:?}"
        );
        drop(manager);

        // Restart: debris gone, old generation still served
        let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
        assert_eq!(reopened.current_id(), Some(GenerationId(1)), "{step:?}");
        assert_eq!(
            entries(&dir),
            vec![POINTER_FILE.to_string(), "gen-00000001".to_string()],
            "{step:?}"
        );

        let next = reopened.publish(&candidate()).unwrap();
        assert_eq!(next, GenerationId(2), "{step:?}");
    }
}

#[test]
fn test_crash_after_pointer_swap_serves_new_generation_on_restart() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();
    manager.publish(&candidate()).unwrap();

    assert!(manager
        .publish_with_crash_injection(&candidate(), PublishStep::RenamePointer)
        .is_err());
    drop(manager);

    let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
    assert_eq!(reopened.current_id(), Some(GenerationId(2)));
    assert_eq!(reopened.publish(&candidate()).unwrap(), GenerationId(3));
}

#[test]
fn test_crash_on_first_publish_leaves_nothing_served() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();
    assert!(manager
        .publish_with_crash_injection(&candidate(), PublishStep::RenameGeneration)
        .is_err());
    drop(manager);

    let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
    assert!(reopened.current().is_none());
    assert!(entries(&dir).is_empty());
}

#[test]
fn test_retention_keeps_newest_generations() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();

    for _ in 0..5 {
        manager.publish(&candidate()).unwrap();
    }

    assert_eq!(
        manager.list_generations().unwrap(),
        vec![GenerationId(3), GenerationId(4), GenerationId(5)]
    );
    assert_eq!(manager.current_id(), Some(GenerationId(5)));
}

#[test]
fn test_unreadable_current_generation_is_not_served() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();
    manager.publish(&candidate()).unwrap();
    drop(manager);

    std::fs::write(dir.path().join("gen-00000001").join("weights.json"), b"{}").unwrap();

    let reopened = ArtifactManager::open(dir.path(), 3).unwrap();
    assert!(reopened.current().is_none());
    // The broken id is never handed out again
    assert_eq!(reopened.publish(&candidate()).unwrap(), GenerationId(2));
    assert_eq!(reopened.current_id(), Some(GenerationId(2)));
}

#[test]
fn test_published_generation_round_trips_from_disk() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();
    let id = manager.publish(&candidate()).unwrap();

    let pointer = read_pointer(dir.path()).unwrap().unwrap();
    let loaded = load_generation(&dir.path().join(pointer.directory)).unwrap();
    let current = manager.current().unwrap();

    assert_eq!(loaded.id(), id);
    assert_eq!(loaded.manifest.trained_row_count, 3);
    assert_eq!(loaded.vocabulary, current.vocabulary);
    assert_eq!(
        loaded.classify("bomb threat at the station").label,
        current.classify("bomb threat at the station").label
    );
}

#[test]
fn test_subscribers_see_new_generations() {
    let dir = TempDir::new().unwrap();
    let manager = ArtifactManager::open(dir.path(), 3).unwrap();
    let mut rx = manager.subscribe();
    assert_eq!(*rx.borrow_and_update(), None);

    manager.publish(&candidate()).unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), Some(GenerationId(1)));
}

#[test]
fn test_concurrent_readers_always_see_a_complete_generation() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ArtifactManager::open(dir.path(), 10).unwrap());
    manager.publish(&candidate()).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let done = Arc::clone(&done);
            let root = dir.path().to_path_buf();
            thread::spawn(move || {
                let mut last_seen = GenerationId(0);
                while !done.load(Ordering::SeqCst) {
                    let generation = manager.current().expect("a generation is always served");
                    let result = generation.classify("buy milk on the way home");
                    assert_eq!(result.generation_id, generation.id());
                    assert!(generation.id() >= last_seen, "generation went backwards");
                    last_seen = generation.id();

                    let pointer = read_pointer(&root).unwrap().unwrap();
                    let on_disk = load_generation(&root.join(&pointer.directory)).unwrap();
                    assert_eq!(on_disk.id(), pointer.generation_id);
                }
            })
        })
        .collect();

    for _ in 0..6 {
        manager.publish(&candidate()).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(manager.current_id(), Some(GenerationId(7)));
}
