//! Training lifecycle API handlers
//!
//! POST /retrain, GET /status

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::{
    error::{ApiError, ApiResult},
    models::{RetrainOutcome, TrainingStatus},
    AppState,
};

/// POST /retrain
///
/// 202 Accepted with the run id, or 409 Conflict when a run is already active.
/// The run continues in the background; poll GET /status for the outcome.
pub async fn retrain(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<RetrainOutcome>)> {
    match state.coordinator.request_retrain().await? {
        outcome @ RetrainOutcome::Started { .. } => Ok((StatusCode::ACCEPTED, Json(outcome))),
        RetrainOutcome::AlreadyRunning => Err(ApiError::Conflict(
            "Training run already in progress".to_string(),
        )),
    }
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<TrainingStatus> {
    Json(state.coordinator.get_status().await)
}

/// Build training routes
pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/retrain", post(retrain))
        .route("/status", get(status))
}
