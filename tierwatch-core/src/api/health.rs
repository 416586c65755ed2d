//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::models::{GenerationId, TrainingState};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" once a generation is loaded, "degraded" before
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub training_state: TrainingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_generation: Option<GenerationId>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let current_generation = state.coordinator.artifacts().current_id();

    Json(HealthResponse {
        status: if current_generation.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "tierwatch".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        training_state: state.coordinator.state(),
        current_generation,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
