//! Atomic TOML write utilities

use std::path::PathBuf;
use tempfile::TempDir;
use tierwatch_common::config::{
    load_toml_config, write_toml_config, LoggingConfig, TomlConfig, TrainingConfig,
};

fn sample_config() -> TomlConfig {
    TomlConfig {
        root_folder: Some(PathBuf::from("/srv/tierwatch")),
        port: Some(9001),
        database_url: Some("sqlite:///srv/tierwatch/records.db".to_string()),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
        training: TrainingConfig {
            seed: 1234,
            ..Default::default()
        },
    }
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("tierwatch.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("tierwatch.toml.tmp").exists());
}

#[test]
fn test_roundtrip_preserves_data() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("tierwatch.toml");

    let config = sample_config();
    write_toml_config(&config, &target).unwrap();

    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_overwrite_replaces_previous_content() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("tierwatch.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    let mut updated = sample_config();
    updated.port = Some(9002);
    write_toml_config(&updated, &target).unwrap();

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("9002"));
    assert!(!content.contains("9001"));
}
