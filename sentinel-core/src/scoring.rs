//! Weighted ensemble scoring.
//!
//! Fuses the per-model crisis signals into a single base score plus a
//! confidence, and computes the irony dampening factor. The scorer is the
//! *pre-amplification* half of the scoring path: the engine may interleave
//! external risk amplification between the base score and the dampening
//! step, so dampening is exposed as a separate operation and is always the
//! last thing applied.
//!
//! Irony participates multiplicatively, never additively: its static weight
//! share is redistributed pro-rata across the additive models before
//! summation, so the additive weights always sum to 1.0 and the fused score
//! can span the full [0, 1] range.

use crate::config::{EngineConfig, LabelsConfig};
use crate::models::{self, BART, EMOTIONS, IRONY, SENTIMENT};
use crate::types::{ModelContribution, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Maximum possible variance of values confined to [0, 1].
const MAX_VARIANCE: f64 = 0.25;

/// Record of the irony dampening factor for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IronyDampening {
    /// P(ironic) reported by the irony wrapper.
    pub irony_probability: f64,
    /// Configured dampening strength α.
    pub alpha: f64,
    /// The multiplicative factor `1 − α × P(ironic)`.
    pub factor: f64,
}

/// Scorer output: the additive fusion plus everything downstream stages
/// need (signals, agreement, the dampening factor).
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    /// Weighted additive fusion of the non-irony signals, pre-dampening.
    pub base_score: f64,
    /// Ensemble confidence in [0, 1].
    pub confidence: f64,
    /// 1 − normalized signal variance, in [0, 1].
    pub agreement: f64,
    /// Strongest individual signal among successful additive models.
    pub max_signal: f64,
    /// Extracted crisis signal per successful *additive* model. Irony is
    /// deliberately absent: its inverted probability is a dampening factor,
    /// not a crisis signal, and including it would poison votes, spread
    /// detection, and conservative resolution for every sincere message.
    pub signals: BTreeMap<String, f64>,
    /// Per-model audit entries (additive models carry their weighted term).
    pub contributions: Vec<ModelContribution>,
    /// Present when the irony wrapper succeeded.
    pub dampening: Option<IronyDampening>,
}

impl ScoreBreakdown {
    /// Apply the irony dampening factor to a (possibly amplified) score.
    /// This is the final step of base scoring and can never raise the score.
    pub fn apply_dampening(&self, score: f64) -> f64 {
        match &self.dampening {
            Some(d) => (score * d.factor).clamp(0.0, 1.0),
            None => score.clamp(0.0, 1.0),
        }
    }

    /// Convenience: the fully dampened score when no amplification ran.
    pub fn final_score(&self) -> f64 {
        self.apply_dampening(self.base_score)
    }
}

/// Fuses four model results into a [`ScoreBreakdown`].
pub struct WeightedScorer {
    labels: LabelsConfig,
    irony_alpha: f64,
}

impl WeightedScorer {
    pub fn new(labels: LabelsConfig, irony_alpha: f64) -> Self {
        Self {
            labels,
            irony_alpha,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.models.labels.clone(), config.scoring.irony_alpha)
    }

    /// Fuse the given results under the given per-model weights.
    ///
    /// `weights` are the effective weights for this request (the fallback
    /// strategy has already redistributed any failed models' shares). The
    /// scorer further renormalizes over the *additive* successful models so
    /// that irony's share is spread pro-rata.
    pub fn score(
        &self,
        results: &[ModelResult],
        weights: &BTreeMap<String, f64>,
    ) -> ScoreBreakdown {
        let mut signals = BTreeMap::new();
        for result in results.iter().filter(|r| r.success) {
            if result.model_name != IRONY {
                signals.insert(
                    result.model_name.clone(),
                    models::crisis_signal(result, &self.labels),
                );
            }
        }

        // Renormalize weights over the successful additive models.
        let additive: Vec<&str> = [BART, SENTIMENT, EMOTIONS]
            .into_iter()
            .filter(|name| signals.contains_key(*name) && weights.contains_key(*name))
            .collect();
        let additive_weight_sum: f64 = additive.iter().map(|n| weights[*n]).sum();

        let mut contributions = Vec::new();
        let mut base_score = 0.0;
        for result in results.iter().filter(|r| r.success) {
            let name = result.model_name.as_str();
            let signal = models::crisis_signal(result, &self.labels);
            let (weight, weighted) = if additive.contains(&name) && additive_weight_sum > 0.0 {
                let w = weights[name] / additive_weight_sum;
                (w, w * signal)
            } else {
                // Irony (and anything unweighted) contributes no additive term.
                (0.0, 0.0)
            };
            base_score += weighted;
            contributions.push(ModelContribution {
                model_name: name.to_string(),
                role: result.role,
                weight,
                signal,
                weighted,
            });
        }
        base_score = base_score.clamp(0.0, 1.0);

        let dampening = results
            .iter()
            .find(|r| r.success && r.model_name == IRONY)
            .map(|r| {
                let p = models::irony_probability(r);
                IronyDampening {
                    irony_probability: p,
                    alpha: self.irony_alpha,
                    factor: (1.0 - self.irony_alpha * p).clamp(0.0, 1.0),
                }
            });

        let (agreement, max_signal) = agreement_and_max(&signals);
        let confidence = confidence_from(agreement, max_signal);

        debug!(
            base_score,
            confidence,
            agreement,
            models = signals.len(),
            dampened = dampening.is_some(),
            "Ensemble fused"
        );

        ScoreBreakdown {
            base_score,
            confidence,
            agreement,
            max_signal,
            signals,
            contributions,
            dampening,
        }
    }
}

/// Agreement (1 − normalized variance) and strongest signal.
pub fn agreement_and_max(signals: &BTreeMap<String, f64>) -> (f64, f64) {
    if signals.is_empty() {
        return (0.0, 0.0);
    }
    let n = signals.len() as f64;
    let mean = signals.values().sum::<f64>() / n;
    let variance = signals.values().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let agreement = (1.0 - variance / MAX_VARIANCE).clamp(0.0, 1.0);
    let max_signal = signals.values().copied().fold(0.0_f64, f64::max);
    (agreement, max_signal)
}

/// The single ensemble confidence formula, shared with the consensus layer.
///
/// Guarantees `confidence ≥ max_signal × agreement` and stays within [0, 1].
pub fn confidence_from(agreement: f64, max_signal: f64) -> f64 {
    (agreement * (max_signal + 0.25 * (1.0 - max_signal))).clamp(0.0, 1.0)
}
