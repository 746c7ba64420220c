//! Secondary sentiment classifier.
//!
//! Three-way negative/neutral/positive classification; the negative score
//! is the crisis signal.

use super::backend::{ClassifyRequest, InferenceBackend};
use super::{CrisisModel, SENTIMENT, classify_to_result};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::types::{ModelResult, ModelRole};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const DEFAULT_MODEL_ID: &str = "cardiffnlp/twitter-roberta-base-sentiment-latest";
const HYPOTHESIS: &str = "The sentiment of this text is {}.";
const WARMUP_PROBE: &str = "Today was fine, nothing special.";

const LABELS: [&str; 3] = ["negative", "neutral", "positive"];

/// Sentiment wrapper contributing the negativity signal.
pub struct SentimentModel {
    backend: Arc<dyn InferenceBackend>,
    enabled: bool,
    loaded: AtomicBool,
    revision: Option<String>,
}

impl SentimentModel {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &ModelConfig) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            loaded: AtomicBool::new(false),
            revision: config.revision.clone(),
        }
    }

    fn request(&self, text: &str) -> ClassifyRequest {
        ClassifyRequest {
            model_id: DEFAULT_MODEL_ID.into(),
            revision: self.revision.clone(),
            text: text.into(),
            labels: LABELS.iter().map(|s| s.to_string()).collect(),
            hypothesis_template: HYPOTHESIS.into(),
            multi_label: false,
        }
    }
}

#[async_trait]
impl CrisisModel for SentimentModel {
    fn name(&self) -> &str {
        SENTIMENT
    }

    fn role(&self) -> ModelRole {
        ModelRole::Secondary
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn analyze(&self, text: &str) -> ModelResult {
        if !self.is_loaded() {
            return ModelResult::failure(SENTIMENT, ModelRole::Secondary, "model not loaded", 0);
        }
        classify_to_result(
            SENTIMENT,
            ModelRole::Secondary,
            &self.backend,
            self.request(text),
        )
        .await
    }

    async fn warmup(&self) -> Result<(), ModelError> {
        self.backend
            .classify(&self.request(WARMUP_PROBE))
            .await
            .map_err(|e| ModelError::WarmupFailed {
                model: SENTIMENT.into(),
                message: e.to_string(),
            })?;
        self.loaded.store(true, Ordering::Release);
        info!(model = SENTIMENT, backend = self.backend.name(), "Model warmed");
        Ok(())
    }

    async fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
        debug!(model = SENTIMENT, "Model unloaded");
    }
}
