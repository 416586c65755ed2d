//! tierwatch-core library interface
//!
//! Incremental corpus sync and model lifecycle orchestration for a tiered
//! message classifier. Exposes public APIs for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, GatewayError, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::services::{InferenceGateway, TrainingCoordinator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TrainingCoordinator>,
    pub gateway: Arc<InferenceGateway>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// The gateway reads from the coordinator's artifact manager
    pub fn new(coordinator: Arc<TrainingCoordinator>) -> Self {
        let gateway = Arc::new(InferenceGateway::new(Arc::clone(coordinator.artifacts())));
        Self {
            coordinator,
            gateway,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::inference_routes())
        .merge(api::training_routes())
        .merge(api::health_routes())
        .with_state(state)
}
