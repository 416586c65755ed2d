//! Error types for tierwatch-core
//!
//! - `PipelineError`: failures inside a training run (sync → train → publish → bookkeeping)
//! - `GatewayError`: failures answering one inference request
//! - `ApiError`: HTTP-facing error with JSON body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::trainer::TrainingError;

/// Training pipeline error taxonomy
///
/// None of these variants ever leave the published generation or the corpus
/// in a modified-in-place state.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Record source unreachable; sync degrades to the local corpus
    #[error("Record source unavailable: {0}")]
    SourceUnavailable(String),

    /// Nothing to train on
    #[error("No data available for training")]
    DataEmpty,

    /// Trainer rejected the dataset or crashed
    #[error("Training failed: {0}")]
    TrainingFailed(#[from] TrainingError),

    /// Generation could not be written or linked; previous generation stays current
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// `mark_trained` rejected after a successful publish
    #[error("Bookkeeping failed: {0}")]
    BookkeepingFailed(String),

    /// Local corpus could not be read or appended
    #[error("Corpus store error: {0}")]
    Corpus(String),

    /// Lock marker could not be created, read or removed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl PipelineError {
    /// Stable snake_case category used in run outcomes
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::DataEmpty => "data_empty",
            PipelineError::TrainingFailed(_) => "training_failed",
            PipelineError::PublishFailed(_) => "publish_failed",
            PipelineError::BookkeepingFailed(_) => "bookkeeping_failed",
            PipelineError::Corpus(_) => "corpus_error",
            PipelineError::Lock(_) => "lock_error",
        }
    }
}

/// Inference request error
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No generation has been published yet
    #[error("No model generation is published yet")]
    NoGeneration,

    /// Text has no classifiable content after sanitization
    #[error("Input text is empty after sanitization")]
    EmptyInput,
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Model or dependency not ready (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Common error: {0}")]
    Common(#[from] tierwatch_common::Error),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NoGeneration => ApiError::Unavailable(err.to_string()),
            GatewayError::EmptyInput => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Pipeline(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PIPELINE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
