//! Inference API handlers
//!
//! POST /classify, POST /entities, POST /analyze

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::{ApiError, ApiResult},
    models::{Entity, GenerationId, Tier},
    AppState,
};

/// Request body shared by every inference endpoint
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// POST /classify response
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub input_text: String,
    pub predicted_class: Tier,
    pub confidence: f64,
    pub probabilities: BTreeMap<Tier, f64>,
    pub generation_id: GenerationId,
}

/// POST /entities response
#[derive(Debug, Serialize)]
pub struct EntitiesResponse {
    pub input_text: String,
    pub entities: Vec<Entity>,
}

/// POST /analyze response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub classification: ClassifyResponse,
    pub entities: Vec<Entity>,
}

fn require_text(request: &TextRequest) -> ApiResult<()> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    Ok(())
}

/// POST /classify
///
/// 503 until a first generation has been published.
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<ClassifyResponse>> {
    require_text(&request)?;
    let classification = state.gateway.classify(&request.text).await?;

    Ok(Json(ClassifyResponse {
        input_text: request.text,
        predicted_class: classification.label,
        confidence: classification.confidence,
        probabilities: classification.probabilities,
        generation_id: classification.generation_id,
    }))
}

/// POST /entities
pub async fn entities(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<EntitiesResponse>> {
    require_text(&request)?;
    let entities = state.gateway.extract_entities(&request.text);

    Ok(Json(EntitiesResponse {
        input_text: request.text,
        entities,
    }))
}

/// POST /analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    require_text(&request)?;
    let analysis = state.gateway.analyze(&request.text).await?;

    Ok(Json(AnalyzeResponse {
        classification: ClassifyResponse {
            input_text: request.text,
            predicted_class: analysis.classification.label,
            confidence: analysis.classification.confidence,
            probabilities: analysis.classification.probabilities,
            generation_id: analysis.classification.generation_id,
        },
        entities: analysis.entities,
    }))
}

/// Build inference routes
pub fn inference_routes() -> Router<AppState> {
    Router::new()
        .route("/classify", post(classify))
        .route("/entities", post(entities))
        .route("/analyze", post(analyze))
}
