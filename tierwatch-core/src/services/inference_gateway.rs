//! Inference gateway
//!
//! Serves classification from the current artifact generation. The loaded
//! generation is cached and dropped as soon as the artifact manager announces
//! a publish; a request sees one generation from start to finish.

use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{Analysis, ArtifactGeneration, Classification, Entity, GenerationId};
use crate::services::artifact_manager::ArtifactManager;
use crate::services::entity_extractor;
use crate::services::sanitizer::sanitize_text;

pub struct InferenceGateway {
    artifacts: Arc<ArtifactManager>,
    cached: RwLock<Option<Arc<ArtifactGeneration>>>,
    publishes: Mutex<watch::Receiver<Option<GenerationId>>>,
}

impl InferenceGateway {
    pub fn new(artifacts: Arc<ArtifactManager>) -> Self {
        let publishes = artifacts.subscribe();
        Self {
            artifacts,
            cached: RwLock::new(None),
            publishes: Mutex::new(publishes),
        }
    }

    /// Generation that will answer the next request
    pub async fn generation(&self) -> Result<Arc<ArtifactGeneration>, GatewayError> {
        {
            let mut publishes = self.publishes.lock().await;
            if publishes.has_changed().unwrap_or(false) {
                publishes.borrow_and_update();
                *self.cached.write().await = None;
                debug!("New generation announced, dropping cached generation");
            }
        }

        if let Some(generation) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(generation));
        }

        let mut cached = self.cached.write().await;
        if let Some(generation) = cached.as_ref() {
            return Ok(Arc::clone(generation));
        }
        let generation = self.artifacts.current().ok_or(GatewayError::NoGeneration)?;
        debug!(generation = %generation.id(), "Loaded generation into inference cache");
        *cached = Some(Arc::clone(&generation));
        Ok(generation)
    }

    /// Classify a raw message
    pub async fn classify(&self, text: &str) -> Result<Classification, GatewayError> {
        let sanitized = sanitize_text(text);
        if sanitized.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        let generation = self.generation().await?;
        Ok(generation.classify(&sanitized))
    }

    /// Rule-based entities of a raw message; needs no generation
    pub fn extract_entities(&self, text: &str) -> Vec<Entity> {
        entity_extractor::extract_entities(text)
    }

    /// Classification plus entities
    pub async fn analyze(&self, text: &str) -> Result<Analysis, GatewayError> {
        let classification = self.classify(text).await?;
        Ok(Analysis {
            classification,
            entities: self.extract_entities(text),
        })
    }
}
