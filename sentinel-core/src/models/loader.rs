//! Model lifecycle: construction, bounded parallel loading, warmup, unload.
//!
//! The loader is the one process-lifetime component besides the response
//! cache. It owns the wrapper registry; readiness means the primary model is
//! loaded. Parallel loading is bounded by a small permit count because the
//! serving backends contend for GPU memory.

use super::backend::{HttpBackend, InferenceBackend, LexiconBackend};
use super::bart::BartModel;
use super::emotions::EmotionsModel;
use super::irony::IronyModel;
use super::sentiment::SentimentModel;
use super::{BART, CrisisModel};
use crate::config::EngineConfig;
use crate::error::ModelError;
use crate::retry::with_deadline;
use crate::types::ModelRole;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Snapshot of one registered wrapper, for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub role: ModelRole,
    pub loaded: bool,
}

/// Registry and lifecycle manager for the ensemble wrappers.
pub struct ModelLoader {
    registry: RwLock<BTreeMap<String, Arc<dyn CrisisModel>>>,
    load_permits: Arc<Semaphore>,
    warmup_timeout: Duration,
}

impl ModelLoader {
    /// Build wrappers from configuration. Models with an `endpoint` get an
    /// HTTP backend; the rest share the in-process lexicon backend.
    /// Disabled models are not registered.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ModelError> {
        let lexicon: Arc<dyn InferenceBackend> = Arc::new(LexiconBackend::new());
        let backend_for = |endpoint: &Option<String>| -> Result<Arc<dyn InferenceBackend>, ModelError> {
            match endpoint {
                Some(url) => Ok(Arc::new(HttpBackend::new(url.clone())?)),
                None => Ok(lexicon.clone()),
            }
        };

        let mut models: Vec<Arc<dyn CrisisModel>> = Vec::new();
        let m = &config.models;
        if m.bart.enabled {
            models.push(Arc::new(BartModel::new(
                backend_for(&m.bart.endpoint)?,
                &m.bart,
                &m.labels,
            )));
        }
        if m.sentiment.enabled {
            models.push(Arc::new(SentimentModel::new(
                backend_for(&m.sentiment.endpoint)?,
                &m.sentiment,
            )));
        }
        if m.irony.enabled {
            models.push(Arc::new(IronyModel::new(
                backend_for(&m.irony.endpoint)?,
                &m.irony,
            )));
        }
        if m.emotions.enabled {
            models.push(Arc::new(EmotionsModel::new(
                backend_for(&m.emotions.endpoint)?,
                &m.emotions,
                &m.labels,
            )));
        }

        Ok(Self::with_models(
            models,
            config.concurrency.load_workers,
            Duration::from_secs_f64(config.timeouts.warmup_s),
        ))
    }

    /// Build a loader over pre-constructed wrappers (tests, custom stacks).
    pub fn with_models(
        models: Vec<Arc<dyn CrisisModel>>,
        load_workers: usize,
        warmup_timeout: Duration,
    ) -> Self {
        let mut registry = BTreeMap::new();
        for model in models {
            registry.insert(model.name().to_string(), model);
        }
        Self {
            registry: RwLock::new(registry),
            load_permits: Arc::new(Semaphore::new(load_workers.max(1))),
            warmup_timeout,
        }
    }

    /// Warm every registered wrapper, at most `load_workers` at a time.
    ///
    /// Non-primary warmup failures degrade (the wrapper stays unloaded and
    /// is skipped at inference time); a primary failure is fatal.
    pub async fn load_all(&self) -> Result<(), ModelError> {
        let models = self.get_all();
        let mut handles = Vec::with_capacity(models.len());
        for model in models {
            let permits = self.load_permits.clone();
            let timeout = self.warmup_timeout;
            handles.push(async move {
                let _permit = permits.acquire().await.expect("semaphore closed");
                let name = model.name().to_string();
                match with_deadline(timeout, model.warmup()).await {
                    Ok(Ok(())) => Ok(name),
                    Ok(Err(e)) => Err((name, e)),
                    Err(elapsed) => Err((
                        name.clone(),
                        ModelError::WarmupFailed {
                            model: name,
                            message: format!("warmup timed out after {}ms", elapsed.timeout_ms),
                        },
                    )),
                }
            });
        }

        let outcomes = futures::future::join_all(handles).await;
        let mut primary_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(name) => info!(model = name.as_str(), "Model loaded"),
                Err((name, e)) => {
                    warn!(model = name.as_str(), error = %e, "Model failed to load");
                    if name == BART {
                        primary_error = Some(e);
                    }
                }
            }
        }

        match primary_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Look up a wrapper by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CrisisModel>> {
        self.registry.read().unwrap().get(name).cloned()
    }

    /// All registered wrappers in name order.
    pub fn get_all(&self) -> Vec<Arc<dyn CrisisModel>> {
        self.registry.read().unwrap().values().cloned().collect()
    }

    /// Registered wrappers that are enabled and loaded.
    pub fn get_enabled(&self) -> Vec<Arc<dyn CrisisModel>> {
        self.get_all()
            .into_iter()
            .filter(|m| m.is_enabled() && m.is_loaded())
            .collect()
    }

    /// Unload one wrapper. Returns false for unknown names.
    pub async fn unload(&self, name: &str) -> bool {
        match self.get(name) {
            Some(model) => {
                model.unload().await;
                true
            }
            None => false,
        }
    }

    /// Unload every wrapper.
    pub async fn unload_all(&self) {
        for model in self.get_all() {
            model.unload().await;
        }
        info!("All models unloaded");
    }

    /// The engine is operational iff the primary model is loaded.
    pub fn is_ready(&self) -> bool {
        self.get(BART).is_some_and(|m| m.is_loaded())
    }

    /// Status snapshot of every registered wrapper.
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.get_all()
            .iter()
            .map(|m| ModelDescriptor {
                name: m.name().to_string(),
                role: m.role(),
                loaded: m.is_loaded(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::MockBackend;
    use crate::models::{EMOTIONS, IRONY, SENTIMENT};

    fn lexicon_loader() -> ModelLoader {
        ModelLoader::from_config(&EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_from_config_registers_enabled_models() {
        let loader = lexicon_loader();
        assert!(loader.get(BART).is_some());
        assert!(loader.get(SENTIMENT).is_some());
        assert!(loader.get(IRONY).is_some());
        assert!(loader.get(EMOTIONS).is_some());
        assert!(loader.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_disabled_model_not_registered() {
        let mut config = EngineConfig::default();
        config.models.emotions.enabled = false;
        let loader = ModelLoader::from_config(&config).unwrap();
        assert!(loader.get(EMOTIONS).is_none());
    }

    #[tokio::test]
    async fn test_load_all_marks_ready() {
        let loader = lexicon_loader();
        assert!(!loader.is_ready());
        loader.load_all().await.unwrap();
        assert!(loader.is_ready());
        assert_eq!(loader.get_enabled().len(), 4);
    }

    #[tokio::test]
    async fn test_unload_all_clears_ready() {
        let loader = lexicon_loader();
        loader.load_all().await.unwrap();
        loader.unload_all().await;
        assert!(!loader.is_ready());
        assert!(loader.get_enabled().is_empty());
    }

    #[tokio::test]
    async fn test_unload_single_model() {
        let loader = lexicon_loader();
        loader.load_all().await.unwrap();
        assert!(loader.unload(IRONY).await);
        assert!(!loader.unload("nope").await);
        assert!(loader.get(IRONY).map(|m| !m.is_loaded()).unwrap());
        // Primary untouched: still ready.
        assert!(loader.is_ready());
    }

    #[tokio::test]
    async fn test_secondary_warmup_failure_degrades() {
        use crate::config::ModelConfig;
        let config = EngineConfig::default();
        let failing = Arc::new(MockBackend::new()); // empty queue: always errors
        let models: Vec<Arc<dyn CrisisModel>> = vec![
            Arc::new(BartModel::new(
                Arc::new(LexiconBackend::new()),
                &config.models.bart,
                &config.models.labels,
            )),
            Arc::new(SentimentModel::new(
                failing,
                &ModelConfig {
                    enabled: true,
                    weight: 0.25,
                    revision: None,
                    endpoint: None,
                },
            )),
        ];
        let loader = ModelLoader::with_models(models, 2, Duration::from_secs(5));
        loader.load_all().await.unwrap();
        assert!(loader.is_ready());
        assert_eq!(loader.get_enabled().len(), 1);
    }

    #[tokio::test]
    async fn test_primary_warmup_failure_is_fatal() {
        let config = EngineConfig::default();
        let models: Vec<Arc<dyn CrisisModel>> = vec![Arc::new(BartModel::new(
            Arc::new(MockBackend::new()),
            &config.models.bart,
            &config.models.labels,
        ))];
        let loader = ModelLoader::with_models(models, 2, Duration::from_secs(5));
        let err = loader.load_all().await.unwrap_err();
        assert!(matches!(err, ModelError::WarmupFailed { .. }));
        assert!(!loader.is_ready());
    }

    #[tokio::test]
    async fn test_descriptors_reflect_state() {
        let loader = lexicon_loader();
        loader.load_all().await.unwrap();
        let descriptors = loader.descriptors();
        assert_eq!(descriptors.len(), 4);
        assert!(descriptors.iter().all(|d| d.loaded));
        let bart = descriptors.iter().find(|d| d.name == BART).unwrap();
        assert_eq!(bart.role, ModelRole::Primary);
    }
}
