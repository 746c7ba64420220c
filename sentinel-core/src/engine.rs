//! The decision engine: per-request orchestration of the whole pipeline.
//!
//! Order per request: cache lookup → parallel inference → weighted fusion →
//! external-risk gate → irony dampening (always last in base scoring) →
//! conflict detection → consensus → resolution → context analysis →
//! aggregation → explanation → cache insert.
//!
//! The engine owns no hidden globals: every collaborator is constructed
//! from the validated configuration and passed in. The model loader and the
//! response cache are the only process-lifetime state; everything else is
//! swapped atomically by `reload_config`.

use crate::aggregator::{AssessmentParts, ResultAggregator};
use crate::alerting::ConflictAlerter;
use crate::cache::{CacheStats, ResponseCache, cache_key};
use crate::config::EngineConfig;
use crate::conflict::{ConflictDetector, ConflictResolver};
use crate::consensus::ConsensusSelector;
use crate::context::ContextAnalyzer;
use crate::error::{EngineError, SentinelError, ValidationError};
use crate::explanation::ExplanationGenerator;
use crate::fallback::{FallbackStrategy, ModelBreakerStatus};
use crate::models::loader::{ModelDescriptor, ModelLoader};
use crate::models::{BART, CrisisModel};
use crate::retry::{InferenceTask, gather_inferences};
use crate::risk_client::RiskClient;
use crate::scoring::WeightedScorer;
use crate::types::{
    AgreementLevel, AnalyzeRequest, ConsensusAlgorithm, ConsensusResult, CrisisAssessment,
    ModelResult, RecommendedAction, ResolutionStrategy, Severity, Verbosity,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Maximum accepted message length, in characters.
const MAX_MESSAGE_CHARS: usize = 10_000;

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub ready: bool,
    pub models: Vec<ModelDescriptor>,
    pub breakers: Vec<ModelBreakerStatus>,
    pub external_risk_enabled: bool,
    pub external_risk_breaker: String,
    pub cache: CacheStats,
}

/// One entry of `GET /models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub weight: f64,
    pub enabled: bool,
}

/// Everything rebuilt wholesale on a config reload.
struct Pipeline {
    config: EngineConfig,
    scorer: WeightedScorer,
    consensus: ConsensusSelector,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    context: ContextAnalyzer,
    explainer: ExplanationGenerator,
    risk_client: RiskClient,
}

impl Pipeline {
    fn build(
        config: EngineConfig,
        alerter: Arc<dyn ConflictAlerter>,
    ) -> Result<Self, SentinelError> {
        config.validate().map_err(SentinelError::Config)?;
        let risk_client =
            RiskClient::new(config.external_risk.clone()).map_err(SentinelError::RiskClient)?;
        Ok(Self {
            scorer: WeightedScorer::from_config(&config),
            consensus: ConsensusSelector::new(config.consensus.clone(), config.thresholds.low),
            detector: ConflictDetector::new(config.conflict.clone()),
            resolver: ConflictResolver::new(config.resolver.default_strategy, alerter),
            context: ContextAnalyzer::new(&config.context),
            explainer: ExplanationGenerator::new(config.thresholds),
            risk_client,
            config,
        })
    }
}

/// Orchestrates the ensemble per request and manages the response cache.
pub struct DecisionEngine {
    pipeline: RwLock<Arc<Pipeline>>,
    loader: Arc<ModelLoader>,
    fallback: FallbackStrategy,
    cache: ResponseCache,
    aggregator: ResultAggregator,
    alerter: Arc<dyn ConflictAlerter>,
}

impl DecisionEngine {
    /// Build an engine and its loader from configuration.
    pub fn new(
        config: EngineConfig,
        alerter: Arc<dyn ConflictAlerter>,
    ) -> Result<Self, SentinelError> {
        let loader = Arc::new(ModelLoader::from_config(&config).map_err(SentinelError::Model)?);
        Self::with_loader(config, loader, alerter)
    }

    /// Build an engine over a pre-constructed loader (tests inject scripted
    /// transports here; the wrappers themselves stay real).
    pub fn with_loader(
        config: EngineConfig,
        loader: Arc<ModelLoader>,
        alerter: Arc<dyn ConflictAlerter>,
    ) -> Result<Self, SentinelError> {
        let fallback = FallbackStrategy::new(config.fallback.clone());
        let cache = ResponseCache::new(&config.cache);
        let pipeline = Pipeline::build(config, alerter.clone())?;
        Ok(Self {
            pipeline: RwLock::new(Arc::new(pipeline)),
            loader,
            fallback,
            cache,
            aggregator: ResultAggregator,
            alerter,
        })
    }

    /// Load and warm all models. Fatal if the primary cannot come up.
    pub async fn start(&self) -> Result<(), SentinelError> {
        self.loader.load_all().await.map_err(SentinelError::Model)
    }

    /// Operational iff the primary model is loaded.
    pub fn is_ready(&self) -> bool {
        self.loader.is_ready()
    }

    /// Shared loader handle (status surface, shutdown hooks).
    pub fn loader(&self) -> Arc<ModelLoader> {
        self.loader.clone()
    }

    /// Validate and atomically swap the configuration. The model loader is
    /// untouched (models are physical resources); the cache is cleared so
    /// stale decisions cannot replay under new tunables, and fallback
    /// counters restart clean.
    pub async fn reload_config(&self, new: EngineConfig) -> Result<(), SentinelError> {
        let pipeline = Pipeline::build(new, self.alerter.clone())?;
        *self.pipeline.write().await = Arc::new(pipeline);
        self.cache.clear();
        self.fallback.reset();
        info!("Engine configuration reloaded");
        Ok(())
    }

    /// Snapshot of the engine's current configuration.
    pub async fn config(&self) -> EngineConfig {
        self.pipeline.read().await.config.clone()
    }

    /// Status snapshot for the HTTP surface.
    pub async fn status(&self) -> EngineStatus {
        let pipeline = self.pipeline.read().await;
        EngineStatus {
            ready: self.is_ready(),
            models: self.loader.descriptors(),
            breakers: self.fallback.snapshot(),
            external_risk_enabled: pipeline.risk_client.is_enabled(),
            external_risk_breaker: pipeline.risk_client.breaker_state().to_string(),
            cache: self.cache.stats(),
        }
    }

    /// Model descriptors joined with their configured weights.
    pub async fn model_info(&self) -> Vec<ModelInfo> {
        let pipeline = self.pipeline.read().await;
        self.loader
            .descriptors()
            .into_iter()
            .map(|d| {
                let cfg = pipeline.config.models.get(&d.name);
                ModelInfo {
                    weight: cfg.map(|c| c.weight).unwrap_or(0.0),
                    enabled: cfg.map(|c| c.enabled).unwrap_or(false),
                    descriptor: d,
                }
            })
            .collect()
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Reset fallback counters and breakers (operator command).
    pub fn reset_fallback(&self) {
        self.fallback.reset();
    }

    /// Analyze one message.
    pub async fn analyze(
        &self,
        request: AnalyzeRequest,
        request_id: Option<&str>,
    ) -> Result<CrisisAssessment, SentinelError> {
        self.analyze_with_cancellation(request, request_id, CancellationToken::new())
            .await
    }

    /// Analyze one message under a caller-owned cancellation token.
    ///
    /// Cancellation is cooperative: in-flight model calls resolve as
    /// cancelled failures, no partial assessment is returned, and the
    /// cancelled request is never cached.
    pub async fn analyze_with_cancellation(
        &self,
        request: AnalyzeRequest,
        request_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<CrisisAssessment, SentinelError> {
        let started = Instant::now();
        let pipeline = self.pipeline.read().await.clone();
        let config = &pipeline.config;

        let message = validate_message(&request.message)?;
        let algorithm = request
            .algorithm
            .unwrap_or(config.consensus.default_algorithm);
        let verbosity = request.verbosity.unwrap_or(config.consensus.verbosity);

        let key = cache_key(&message, algorithm, verbosity, &request.history);
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        if !self.loader.is_ready() {
            return Err(SentinelError::Engine(EngineError::NotReady));
        }
        if !self.fallback.primary_available() {
            warn!(request_id, "Primary model breaker open, returning degraded assessment");
            return Ok(self.degraded_assessment(
                &pipeline,
                algorithm,
                "the primary model's circuit breaker is open",
                Vec::new(),
                started,
                verbosity,
            ));
        }

        // Step 2: parallel inference with per-model and global budgets. The
        // gather gets a child token so that cancelling stragglers after a
        // primary failure is not mistaken for caller cancellation.
        if cancel.is_cancelled() {
            return Err(SentinelError::Engine(EngineError::Cancelled));
        }
        let results = self
            .run_inference(&pipeline, &message, cancel.child_token())
            .await;
        if cancel.is_cancelled() {
            return Err(SentinelError::Engine(EngineError::Cancelled));
        }
        for result in &results {
            if result.success {
                self.fallback.record_success(&result.model_name);
            } else {
                self.fallback.record_failure(&result.model_name);
            }
        }

        let primary_ok = results.iter().any(|r| r.model_name == BART && r.success);
        if !primary_ok {
            let reason = results
                .iter()
                .find(|r| r.model_name == BART)
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| "primary model unavailable".into());
            let failure = EngineError::CriticalModelFailure {
                model: BART.to_string(),
                message: reason.clone(),
            };
            warn!(request_id, error = %failure, "Returning degraded assessment");
            let models_used = results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.model_name.clone())
                .collect();
            return Ok(self.degraded_assessment(
                &pipeline,
                algorithm,
                &reason,
                models_used,
                started,
                verbosity,
            ));
        }

        // Step 3: weighted fusion under redistributed weights.
        let survivors: BTreeSet<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.model_name.clone())
            .collect();
        let weights = self
            .fallback
            .effective_weights(&config.models.enabled_weights(), &survivors);
        let breakdown = pipeline.scorer.score(&results, &weights);
        let base_severity = config.thresholds.classify(breakdown.base_score);

        // Step 4: external risk amplification (gated).
        let external = pipeline
            .risk_client
            .assess(&message, breakdown.base_score, base_severity)
            .await;
        let amplified = external.amplified.unwrap_or(breakdown.base_score);

        // Step 5: irony dampening, always the last step of base scoring.
        let mut crisis_score = breakdown.apply_dampening(amplified);

        // Step 6: conflicts, consensus, resolution.
        let conflicts = pipeline.detector.detect(&results, &breakdown.signals);
        let consensus =
            pipeline
                .consensus
                .select(algorithm, &breakdown, crisis_score, Some(&conflicts));
        if algorithm == ConsensusAlgorithm::Unanimous {
            crisis_score = consensus.final_score;
        }

        let resolution = if conflicts.is_empty() {
            None
        } else {
            // Two cases pin the strategy to a review flag: a critical
            // conflict under the conflict-aware algorithm, and a unanimous
            // vote with dissent, where the consensus verdict (no crisis,
            // human review) must not be overridden by score replacement.
            let force_review = (algorithm == ConsensusAlgorithm::ConflictAware
                && conflicts.has_critical())
                || (algorithm == ConsensusAlgorithm::Unanimous && consensus.requires_review);
            let forced = force_review.then_some(ResolutionStrategy::ReviewFlag);
            let resolution = pipeline.resolver.resolve(
                forced,
                crisis_score,
                &breakdown.signals,
                &conflicts,
                request_id,
            );
            crisis_score = resolution.resolved_score.clamp(0.0, 1.0);
            Some(resolution)
        };

        let severity = config.thresholds.classify(crisis_score);

        // Step 7: context analysis (validation failures are request errors).
        let context = pipeline.context.analyze(
            &message,
            crisis_score,
            severity,
            request.timezone.as_deref(),
            &request.history,
            chrono::Utc::now(),
        )?;

        // Step 8: aggregate and explain.
        let models_used: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.model_name.clone())
            .collect();
        let mut assessment = self.aggregator.assemble(AssessmentParts {
            crisis_score,
            severity,
            confidence: breakdown.confidence,
            contributions: breakdown.contributions.clone(),
            consensus,
            conflicts: Some(conflicts),
            resolution,
            context,
            external_risk: Some(external),
            models_used,
            is_degraded: false,
            processing_time_ms: started.elapsed().as_millis() as u64,
        });
        assessment.explanation = pipeline.explainer.render(&assessment, verbosity);

        self.cache.put(key, assessment.clone());
        Ok(assessment)
    }

    /// Analyze a batch sequentially, in input order. Item failures never
    /// fail the batch.
    pub async fn analyze_batch(
        &self,
        requests: Vec<AnalyzeRequest>,
        request_id: Option<&str>,
    ) -> Vec<Result<CrisisAssessment, SentinelError>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.analyze(request, request_id).await);
        }
        outcomes
    }

    async fn run_inference(
        &self,
        pipeline: &Pipeline,
        message: &str,
        cancel: CancellationToken,
    ) -> Vec<ModelResult> {
        let per_model = Duration::from_secs_f64(pipeline.config.timeouts.per_model_s);
        let global = Duration::from_secs_f64(pipeline.config.timeouts.global_s);

        let tasks: Vec<InferenceTask> = self
            .loader
            .get_enabled()
            .into_iter()
            .filter(|m| !self.fallback.is_open(m.name()))
            .map(|model: Arc<dyn CrisisModel>| {
                let text = message.to_string();
                InferenceTask {
                    model_name: model.name().to_string(),
                    role: model.role(),
                    future: Box::pin(async move { model.analyze(&text).await }),
                }
            })
            .collect();

        gather_inferences(tasks, per_model, global, cancel).await
    }

    /// Structured fallback when the primary model cannot answer: severity
    /// safe, degraded flag, explanation that says why. Never an error.
    fn degraded_assessment(
        &self,
        pipeline: &Pipeline,
        algorithm: ConsensusAlgorithm,
        reason: &str,
        models_used: Vec<String>,
        started: Instant,
        verbosity: Verbosity,
    ) -> CrisisAssessment {
        let consensus = ConsensusResult {
            algorithm,
            agreement: AgreementLevel::None,
            final_score: 0.0,
            confidence: 0.0,
            votes: Vec::new(),
            requires_review: false,
        };
        let mut assessment = self.aggregator.assemble(AssessmentParts {
            crisis_score: 0.0,
            severity: Severity::Safe,
            confidence: 0.0,
            contributions: Vec::new(),
            consensus,
            conflicts: None,
            resolution: None,
            context: None,
            external_risk: None,
            models_used,
            is_degraded: true,
            processing_time_ms: started.elapsed().as_millis() as u64,
        });
        assessment.recommended_action = RecommendedAction::Monitor;
        assessment.explanation = format!(
            "{}\nDegraded assessment: {reason}. The message was not classified; treat automated severity as unknown.",
            pipeline.explainer.render(&assessment, verbosity)
        );
        assessment
    }
}

/// Trim and bound the message text.
fn validate_message(message: &str) -> Result<String, ValidationError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong {
            max: MAX_MESSAGE_CHARS,
            got: chars,
        });
    }
    Ok(trimmed.to_string())
}
