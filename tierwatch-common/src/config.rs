//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from (highest priority first):
//! 1. Command-line argument
//! 2. Environment variable (`TIERWATCH_ROOT_FOLDER`, then `TIERWATCH_ROOT`)
//! 3. TOML config file (`~/.config/tierwatch/<module>.toml`)
//! 4. OS-dependent compiled default
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! built-in defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "TIERWATCH_ROOT_FOLDER";
/// Alternative root folder environment variable
pub const ROOT_ENV: &str = "TIERWATCH_ROOT";

/// Built-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            port: default_port(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("tierwatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tierwatch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tierwatch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tierwatch"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tierwatch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tierwatch"))
    } else {
        PathBuf::from("./tierwatch_data")
    }
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional in the file; absent fields take built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data root holding the corpus, lock marker and artifact generations
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Database URL for the labeled record store (sqlx connection string)
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub training: TrainingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Training run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed for the train/validation partition
    pub seed: u64,
    /// Fraction of the corpus held out for validation, in `[0, 1)`
    pub validation_ratio: f64,
    /// Vocabulary size cap (most frequent words kept)
    pub max_vocab_words: usize,
    /// Tokens considered per message
    pub max_sequence_len: usize,
    /// A lock marker whose heartbeat is older than this is stale
    pub lock_stale_after_secs: u64,
    /// Heartbeat refresh interval while a run holds the lock
    pub lock_heartbeat_secs: u64,
    /// Published generations kept on disk (current included)
    pub retain_generations: usize,
    /// Scheduled retrain period; 0 disables the scheduler
    pub retrain_interval_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            validation_ratio: 0.1,
            max_vocab_words: 10_000,
            max_sequence_len: 100,
            lock_stale_after_secs: 4 * 30,
            lock_heartbeat_secs: 30,
            retain_generations: 3,
            retrain_interval_secs: 0,
        }
    }
}

impl TrainingConfig {
    /// Reject parameter combinations that cannot produce a sane run
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_ratio) {
            return Err(Error::Config(format!(
                "validation_ratio must be in [0, 1), got {}",
                self.validation_ratio
            )));
        }
        if self.retain_generations == 0 {
            return Err(Error::Config(
                "retain_generations must be at least 1".to_string(),
            ));
        }
        if self.max_vocab_words == 0 || self.max_sequence_len == 0 {
            return Err(Error::Config(
                "max_vocab_words and max_sequence_len must be positive".to_string(),
            ));
        }
        if self.lock_heartbeat_secs == 0 || self.lock_heartbeat_secs >= self.lock_stale_after_secs {
            return Err(Error::Config(format!(
                "lock_heartbeat_secs ({}) must be positive and below lock_stale_after_secs ({})",
                self.lock_heartbeat_secs, self.lock_stale_after_secs
            )));
        }
        Ok(())
    }
}

/// Path of the TOML config file for a module
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tierwatch").join(format!("{module_name}.toml")))
}

/// Load TOML config from `path`
///
/// A missing file yields defaults. A file that exists but does not parse is
/// an error, since silently ignoring it would hide operator mistakes.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using built-in defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    config.training.validate()?;

    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write TOML config atomically (write temp file, then rename over target)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Resolves the data root folder for a module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            config_path: None,
        }
    }

    /// Command-line override (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Read the TOML tier from `path` instead of the module's default file
    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    /// Resolve the root folder; never fails, falls back to compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ROOT_ENV) {
            return PathBuf::from(path);
        }

        let config_path = self
            .config_path
            .clone()
            .or_else(|| config_file_path(&self.module_name));
        if let Some(config_path) = config_path {
            if config_path.exists() {
                match load_toml_config(&config_path) {
                    Ok(TomlConfig {
                        root_folder: Some(root_folder),
                        ..
                    }) => return root_folder,
                    Ok(_) => {}
                    Err(e) => warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Ignoring unreadable config file for root folder resolution"
                    ),
                }
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and names the files that live in it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create root folder (and parents) if missing; idempotent
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    /// Default local database used as the record store when no URL is configured
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("tierwatch.db")
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Append-only training corpus
    pub fn corpus_path(&self) -> PathBuf {
        self.root_folder.join("corpus.csv")
    }

    /// Training lock marker
    pub fn lock_path(&self) -> PathBuf {
        self.root_folder.join("training.lock")
    }

    /// Directory holding published artifact generations
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root_folder.join("artifacts")
    }
}
