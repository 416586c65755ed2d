//! Configuration resolution for the tierwatch service
//!
//! Priority for every setting: command line (clap, which also reads the
//! `TIERWATCH_*` environment variables) → TOML file → built-in default.

use std::path::PathBuf;
use tracing::info;

use tierwatch_common::config::{
    config_file_path, load_toml_config, CompiledDefaults, RootFolderInitializer,
    RootFolderResolver, TomlConfig, TrainingConfig,
};
use tierwatch_common::Result;

/// Module name used for the TOML file (`~/.config/tierwatch/tierwatch.toml`)
pub const MODULE_NAME: &str = "tierwatch";

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub config: Option<PathBuf>,
    pub retrain_interval_secs: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub root_folder: PathBuf,
    pub port: u16,
    /// `None` means the sqlite file inside the root folder
    pub database_url: Option<String>,
    pub log_level: String,
    pub training: TrainingConfig,
}

impl OrchestratorConfig {
    /// Resolve configuration from all tiers
    ///
    /// A missing TOML file falls back to defaults; a malformed one is an error.
    pub fn resolve(cli: CliOverrides) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .or_else(|| config_file_path(MODULE_NAME));
        let toml = match &config_path {
            Some(path) => load_toml_config(path)?,
            None => TomlConfig::default(),
        };

        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(cli.root_folder)
            .with_config_path(config_path)
            .resolve();

        let defaults = CompiledDefaults::for_current_platform();
        let mut training = toml.training;
        if let Some(secs) = cli.retrain_interval_secs {
            training.retrain_interval_secs = secs;
        }
        training.validate()?;

        let config = Self {
            root_folder,
            port: cli.port.or(toml.port).unwrap_or(defaults.port),
            database_url: cli.database_url.or(toml.database_url),
            log_level: toml.logging.level,
            training,
        };

        info!(
            root_folder = %config.root_folder.display(),
            port = config.port,
            "Configuration resolved"
        );
        Ok(config)
    }

    pub fn layout(&self) -> RootFolderInitializer {
        RootFolderInitializer::new(self.root_folder.clone())
    }
}
