//! Primary zero-shot crisis classifier.
//!
//! Scores the message against the configured crisis and safe label sets.
//! This is the wrapper whose failure is fatal for a request: the engine
//! refuses to fabricate an assessment without it.

use super::backend::{ClassifyRequest, InferenceBackend};
use super::{BART, CrisisModel, classify_to_result};
use crate::config::{LabelsConfig, ModelConfig};
use crate::error::ModelError;
use crate::types::{ModelResult, ModelRole};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const DEFAULT_MODEL_ID: &str = "facebook/bart-large-mnli";
const HYPOTHESIS: &str = "This text expresses {}.";
const WARMUP_PROBE: &str = "I had a rough week but I'm hanging in there.";

/// Zero-shot classification wrapper over the crisis label set.
pub struct BartModel {
    backend: Arc<dyn InferenceBackend>,
    enabled: bool,
    loaded: AtomicBool,
    revision: Option<String>,
    labels: Vec<String>,
}

impl BartModel {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        config: &ModelConfig,
        labels: &LabelsConfig,
    ) -> Self {
        let mut label_set = labels.crisis.clone();
        label_set.extend(labels.safe.iter().cloned());
        Self {
            backend,
            enabled: config.enabled,
            loaded: AtomicBool::new(false),
            revision: config.revision.clone(),
            labels: label_set,
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
impl CrisisModel for BartModel {
    fn name(&self) -> &str {
        BART
    }

    fn role(&self) -> ModelRole {
        ModelRole::Primary
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn analyze(&self, text: &str) -> ModelResult {
        if !self.is_loaded() {
            return ModelResult::failure(BART, ModelRole::Primary, "model not loaded", 0);
        }
        classify_to_result(BART, ModelRole::Primary, &self.backend, self.request(text)).await
    }

    async fn warmup(&self) -> Result<(), ModelError> {
        self.backend
            .classify(&self.request(WARMUP_PROBE))
            .await
            .map_err(|e| ModelError::WarmupFailed {
                model: BART.into(),
                message: e.to_string(),
            })?;
        self.loaded.store(true, Ordering::Release);
        info!(model = BART, backend = self.backend.name(), "Model warmed");
        Ok(())
    }

    async fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
        debug!(model = BART, "Model unloaded");
    }
}
