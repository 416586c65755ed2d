//! tierwatch - message classification service with incremental retraining
//!
//! Serves tier classification and entity extraction over HTTP while a
//! background coordinator folds newly labeled records into the corpus,
//! retrains, and atomically publishes new model generations.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tierwatch_core::config::{CliOverrides, OrchestratorConfig};
use tierwatch_core::db::{connect_record_store, init_database_pool, SqlRecordSource};
use tierwatch_core::services::{
    ArtifactManager, CoordinatorSettings, LocalCorpusStore, NaiveBayesTrainer, RecordSource,
    TrainingCoordinator,
};
use tierwatch_core::AppState;

#[derive(Debug, Parser)]
#[command(name = "tierwatch", version, about = "Tiered message classifier with incremental retraining")]
struct Args {
    /// HTTP port
    #[arg(long, env = "TIERWATCH_PORT")]
    port: Option<u16>,

    /// Data root (corpus, lock marker, artifact generations)
    #[arg(long, env = "TIERWATCH_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/tierwatch/tierwatch.toml)
    #[arg(long, env = "TIERWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Labeled record store URL (default: sqlite file in the data root)
    #[arg(long, env = "TIERWATCH_DATABASE_URL")]
    database_url: Option<String>,

    /// Retrain every N seconds; 0 disables scheduled retraining
    #[arg(long, env = "TIERWATCH_RETRAIN_INTERVAL_SECS")]
    retrain_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = OrchestratorConfig::resolve(CliOverrides {
        root_folder: args.root_folder,
        port: args.port,
        database_url: args.database_url,
        config: args.config,
        retrain_interval_secs: args.retrain_interval_secs,
    })?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tierwatch={0},tierwatch_core={0},tierwatch_common={0},tower_http=info",
            config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting tierwatch");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let layout = config.layout();
    layout
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!(root_folder = %layout.root_folder().display(), "Data root ready");

    let pool = match &config.database_url {
        Some(url) => connect_record_store(url).await?,
        None => init_database_pool(&layout.database_path()).await?,
    };
    let source = Arc::new(SqlRecordSource::new(pool));
    if let Err(e) = source.ensure_schema().await {
        warn!(error = %e, "Record store schema check failed; sync will degrade until it is reachable");
    }

    let training = &config.training;
    let artifacts = Arc::new(
        ArtifactManager::open(layout.artifacts_dir(), training.retain_generations)
            .context("Failed to open artifacts directory")?,
    );
    let trainer = Arc::new(NaiveBayesTrainer::new(
        training.max_vocab_words,
        training.max_sequence_len,
    ));

    let coordinator = TrainingCoordinator::new(
        source,
        LocalCorpusStore::new(layout.corpus_path()),
        trainer,
        artifacts,
        layout.lock_path(),
        CoordinatorSettings::from(training),
    )
    .context("Failed to initialize training coordinator")?;

    let scheduler = (training.retrain_interval_secs > 0).then(|| {
        info!(every_secs = training.retrain_interval_secs, "Scheduled retraining enabled");
        coordinator.spawn_scheduler(Duration::from_secs(training.retrain_interval_secs))
    });

    let state = AppState::new(coordinator);
    let app = tierwatch_core::build_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    info!("tierwatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
