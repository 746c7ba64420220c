//! Tertiary irony classifier.
//!
//! Binary ironic/non-ironic classification. Unlike the other wrappers this
//! signal is not additive: the scorer uses P(ironic) as a multiplicative
//! dampening factor, because ironic "I'm dying lol" messages are the main
//! source of false positives.

use super::backend::{ClassifyRequest, InferenceBackend};
use super::{CrisisModel, IRONY, classify_to_result};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::types::{ModelResult, ModelRole};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const DEFAULT_MODEL_ID: &str = "cardiffnlp/twitter-roberta-base-irony";
const HYPOTHESIS: &str = "This text is {}.";
const WARMUP_PROBE: &str = "oh great, another monday";

const LABELS: [&str; 2] = ["ironic", "non-ironic"];

/// Irony wrapper feeding the dampening factor.
pub struct IronyModel {
    backend: Arc<dyn InferenceBackend>,
    enabled: bool,
    loaded: AtomicBool,
    revision: Option<String>,
}

impl IronyModel {
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
impl CrisisModel for IronyModel {
    fn name(&self) -> &str {
        IRONY
    }

    fn role(&self) -> ModelRole {
        ModelRole::Tertiary
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn analyze(&self, text: &str) -> ModelResult {
        if !self.is_loaded() {
            return ModelResult::failure(IRONY, ModelRole::Tertiary, "model not loaded", 0);
        }
        classify_to_result(IRONY, ModelRole::Tertiary, &self.backend, self.request(text)).await
    }

    async fn warmup(&self) -> Result<(), ModelError> {
        self.backend
            .classify(&self.request(WARMUP_PROBE))
            .await
            .map_err(|e| ModelError::WarmupFailed {
                model: IRONY.into(),
                message: e.to_string(),
            })?;
        self.loaded.store(true, Ordering::Release);
        info!(model = IRONY, backend = self.backend.name(), "Model warmed");
        Ok(())
    }

    async fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
        debug!(model = IRONY, "Model unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::LexiconBackend;
    use crate::models::irony_probability;

    fn lexicon_model() -> IronyModel {
        IronyModel::new(
            Arc::new(LexiconBackend::new()),
            &ModelConfig {
                enabled: true,
                weight: 0.15,
                revision: None,
                endpoint: None,
            },
        )
    }

    #[tokio::test]
    async fn test_ironic_text_has_high_probability() {
        let model = lexicon_model();
        model.warmup().await.unwrap();
        let result = model
            .analyze("lol this game is killing me, so funny 😂")
            .await;
        assert!(result.success);
        let p = irony_probability(&result);
        assert!(p > 0.8, "irony probability {p}");
    }

    #[tokio::test]
    async fn test_plain_text_has_low_probability() {
        let model = lexicon_model();
        model.warmup().await.unwrap();
        let result = model.analyze("I don't know how much longer I can hold on").await;
        let p = irony_probability(&result);
        assert!(p < 0.2, "irony probability {p}");
    }

    #[tokio::test]
    async fn test_disabled_flag_carried_from_config() {
        let model = IronyModel::new(
            Arc::new(LexiconBackend::new()),
            &ModelConfig {
                enabled: false,
                weight: 0.15,
                revision: None,
                endpoint: None,
            },
        );
        assert!(!model.is_enabled());
    }
}
