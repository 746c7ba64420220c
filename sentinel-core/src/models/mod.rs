//! Model wrappers: a uniform inference interface over four heterogeneous
//! classifiers.
//!
//! Each wrapper turns raw label distributions (produced by an
//! [`backend::InferenceBackend`]) into a [`ModelResult`] and defines how its
//! crisis signal is read out of that result:
//!
//! | wrapper | role | signal |
//! |---|---|---|
//! | bart | primary | max score over the crisis label set |
//! | sentiment | secondary | score("negative") |
//! | irony | tertiary | 1 − score("ironic"), used multiplicatively |
//! | emotions | supplementary | Σ crisis-correlated emotion scores, capped |
//!
//! Wrappers never raise out of `analyze`: failures come back as a
//! `ModelResult` with `success = false`. Timeouts are the engine's job.

pub mod backend;
pub mod bart;
pub mod emotions;
pub mod irony;
pub mod loader;
pub mod sentiment;

use crate::config::LabelsConfig;
use crate::error::ModelError;
use crate::types::{ModelResult, ModelRole};
use async_trait::async_trait;
use backend::{ClassifyRequest, InferenceBackend};
use std::sync::Arc;
use std::time::Instant;

/// Wrapper name of the primary zero-shot classifier.
pub const BART: &str = "bart";
/// Wrapper name of the sentiment classifier.
pub const SENTIMENT: &str = "sentiment";
/// Wrapper name of the irony classifier.
pub const IRONY: &str = "irony";
/// Wrapper name of the emotions classifier.
pub const EMOTIONS: &str = "emotions";

/// All wrapper names in role order.
pub const ALL_MODELS: [&str; 4] = [BART, SENTIMENT, IRONY, EMOTIONS];

/// Uniform contract over the four ensemble classifiers.
#[async_trait]
pub trait CrisisModel: Send + Sync {
    /// Stable wrapper name ("bart", "sentiment", "irony", "emotions").
    fn name(&self) -> &str;

    /// Role tier, which drives weighting and failure semantics.
    fn role(&self) -> ModelRole;

    /// Whether configuration enables this wrapper.
    fn is_enabled(&self) -> bool;

    /// Whether the wrapper has been loaded and warmed.
    fn is_loaded(&self) -> bool;

    /// Classify one message. Never returns an error; failures are folded
    /// into the result.
    async fn analyze(&self, text: &str) -> ModelResult;

    /// Load and warm the model with a representative probe input.
    async fn warmup(&self) -> Result<(), ModelError>;

    /// Release the model's resources.
    async fn unload(&self);
}

/// Shared classify-and-fold helper used by every wrapper: measures latency
/// and converts backend errors into failure results.
pub(crate) async fn classify_to_result(
    name: &str,
    role: ModelRole,
    backend: &Arc<dyn InferenceBackend>,
    request: ClassifyRequest,
) -> ModelResult {
    let start = Instant::now();
    match backend.classify(&request).await {
        Ok(output) => ModelResult::success(
            name,
            role,
            output.scores,
            start.elapsed().as_millis() as u64,
        ),
        Err(e) => ModelResult::failure(name, role, e.to_string(), start.elapsed().as_millis() as u64),
    }
}

// ---------------------------------------------------------------------------
// Signal extraction
// ---------------------------------------------------------------------------

/// Extract a wrapper's crisis signal from its result, per the table above.
///
/// Failed results carry no signal; callers filter on `success` first.
pub fn crisis_signal(result: &ModelResult, labels: &LabelsConfig) -> f64 {
    if !result.success {
        return 0.0;
    }
    match result.model_name.as_str() {
        BART => labels
            .crisis
            .iter()
            .map(|l| result.label_score(l))
            .fold(0.0_f64, f64::max),
        SENTIMENT => result.label_score("negative"),
        IRONY => (1.0 - result.label_score("ironic")).clamp(0.0, 1.0),
        EMOTIONS => labels
            .crisis_emotions
            .iter()
            .map(|l| result.label_score(l))
            .sum::<f64>()
            .min(1.0),
        _ => 0.0,
    }
}

/// P(ironic) from the irony wrapper's result, 0.0 for anything else.
pub fn irony_probability(result: &ModelResult) -> f64 {
    if result.success && result.model_name == IRONY {
        result.label_score("ironic").clamp(0.0, 1.0)
    } else {
        0.0
    }
}
