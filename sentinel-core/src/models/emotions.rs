//! Supplementary emotion classifier.
//!
//! Scores the configured emotion categories; the crisis signal is the
//! capped sum of the crisis-correlated subset (sadness, fear, anger, grief,
//! despair by default). A cheap corroborating signal, never decisive on its
//! own.

use super::backend::{ClassifyRequest, InferenceBackend};
use super::{CrisisModel, EMOTIONS, classify_to_result};
use crate::config::{LabelsConfig, ModelConfig};
use crate::error::ModelError;
use crate::types::{ModelResult, ModelRole};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const DEFAULT_MODEL_ID: &str = "SamLowe/roberta-base-go_emotions";
const HYPOTHESIS: &str = "This person feels {}.";
const WARMUP_PROBE: &str = "honestly just tired today";

/// Emotion-category wrapper.
pub struct EmotionsModel {
    backend: Arc<dyn InferenceBackend>,
    enabled: bool,
    loaded: AtomicBool,
    revision: Option<String>,
    labels: Vec<String>,
}

impl EmotionsModel {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        config: &ModelConfig,
        labels: &LabelsConfig,
    ) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            loaded: AtomicBool::new(false),
            revision: config.revision.clone(),
            labels: labels.emotions.clone(),
        }
    }

    fn request(&self, text: &str) -> ClassifyRequest {
        ClassifyRequest {
            model_id: DEFAULT_MODEL_ID.into(),
            revision: self.revision.clone(),
            text: text.into(),
            labels: self.labels.clone(),
            hypothesis_template: HYPOTHESIS.into(),
            multi_label: true,
        }
    }
}

#[async_trait]
impl CrisisModel for EmotionsModel {
    fn name(&self) -> &str {
        EMOTIONS
    }

    fn role(&self) -> ModelRole {
        ModelRole::Supplementary
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn analyze(&self, text: &str) -> ModelResult {
        if !self.is_loaded() {
            return ModelResult::failure(EMOTIONS, ModelRole::Supplementary, "model not loaded", 0);
        }
        classify_to_result(
            EMOTIONS,
            ModelRole::Supplementary,
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
                model: EMOTIONS.into(),
                message: e.to_string(),
            })?;
        self.loaded.store(true, Ordering::Release);
        info!(model = EMOTIONS, backend = self.backend.name(), "Model warmed");
        Ok(())
    }

    async fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
        debug!(model = EMOTIONS, "Model unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::{LexiconBackend, MockBackend};
    use crate::models::crisis_signal;

    fn model_config() -> ModelConfig {
        ModelConfig {
            enabled: true,
            weight: 0.10,
            revision: None,
            endpoint: None,
        }
    }

    #[tokio::test]
    async fn test_distressed_text_accumulates_crisis_emotions() {
        let model = EmotionsModel::new(
            Arc::new(LexiconBackend::new()),
            &model_config(),
            &LabelsConfig::default(),
        );
        model.warmup().await.unwrap();
        let result = model.analyze("so scared and sad, crying, hopeless").await;
        assert!(result.success);
        let signal = crisis_signal(&result, &LabelsConfig::default());
        assert!(signal > 0.8, "signal {signal}");
    }

    #[tokio::test]
    async fn test_joyful_text_contributes_nothing() {
        let model = EmotionsModel::new(
            Arc::new(LexiconBackend::new()),
            &model_config(),
            &LabelsConfig::default(),
        );
        model.warmup().await.unwrap();
        let result = model.analyze("so happy and excited, what a joy").await;
        let signal = crisis_signal(&result, &LabelsConfig::default());
        assert!(signal < 0.2, "signal {signal}");
    }

    #[tokio::test]
    async fn test_label_set_comes_from_config() {
        let backend = Arc::new(MockBackend::with_scores(&[("neutral", 0.9)]));
        let labels = LabelsConfig {
            emotions: vec!["sadness".into(), "neutral".into()],
            ..LabelsConfig::default()
        };
        let model = EmotionsModel::new(backend.clone(), &model_config(), &labels);
        model.warmup().await.unwrap();
        model.analyze("hello").await;
        let last = backend.seen_requests().last().unwrap().clone();
        assert_eq!(last.labels, vec!["sadness", "neutral"]);
    }
}
