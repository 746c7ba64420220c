//! Conflict detection over the ensemble's per-model signals.
//!
//! Four rules, evaluated in a fixed order so the report is deterministic:
//!
//! 1. `score_spread` — max−min signal spread over threshold.
//! 2. `irony_vs_sentiment` — strong irony against strong negativity (or
//!    against a strong primary signal): likely sarcasm.
//! 3. `emotion_vs_crisis` — strong primary with weak crisis emotions, or
//!    the reverse.
//! 4. `label_mismatch` — top labels across models fall into incompatible
//!    buckets.
//!
//! The detector is pure: no side effects, no clock, no configuration writes.

use crate::config::ConflictConfig;
use crate::models::{BART, EMOTIONS, IRONY, SENTIMENT, irony_probability};
use crate::types::{
    ConflictReport, ConflictSeverity, ConflictType, DetectedConflict, ModelResult,
};
use std::collections::BTreeMap;

/// Pure rule-chain conflict detector.
pub struct ConflictDetector {
    config: ConflictConfig,
}

impl ConflictDetector {
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    /// Run every rule over the successful results and their signals.
    pub fn detect(
        &self,
        results: &[ModelResult],
        signals: &BTreeMap<String, f64>,
    ) -> ConflictReport {
        let mut conflicts = Vec::new();

        if let Some(conflict) = self.score_spread(signals) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = self.irony_vs_sentiment(results, signals) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = self.emotion_vs_crisis(signals) {
            conflicts.push(conflict);
        }
        if let Some(conflict) = self.label_mismatch(results) {
            conflicts.push(conflict);
        }

        ConflictReport { conflicts }
    }

    /// Rule 1: spread between the strongest and weakest signal.
    fn score_spread(&self, signals: &BTreeMap<String, f64>) -> Option<DetectedConflict> {
        if signals.len() < 2 {
            return None;
        }
        let max_entry = signals
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        let min_entry = signals
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let spread = max_entry.1 - min_entry.1;
        if spread < self.config.spread_threshold {
            return None;
        }
        let severity = if spread >= self.config.critical_threshold {
            ConflictSeverity::Critical
        } else {
            ConflictSeverity::Warning
        };
        Some(DetectedConflict {
            kind: ConflictType::ScoreSpread,
            severity,
            models_involved: vec![max_entry.0.clone(), min_entry.0.clone()],
            magnitude: spread,
            description: format!(
                "signal spread of {spread:.2} between {} ({:.2}) and {} ({:.2})",
                max_entry.0, max_entry.1, min_entry.0, min_entry.1
            ),
        })
    }

    /// Rule 2: high irony against strong negativity or a strong primary.
    fn irony_vs_sentiment(
        &self,
        results: &[ModelResult],
        signals: &BTreeMap<String, f64>,
    ) -> Option<DetectedConflict> {
        let irony_result = results.iter().find(|r| r.success && r.model_name == IRONY)?;
        let irony_p = irony_probability(irony_result);
        if irony_p < self.config.strong_signal {
            return None;
        }

        let negative = results
            .iter()
            .find(|r| r.success && r.model_name == SENTIMENT)
            .map(|r| r.label_score("negative"))
            .unwrap_or(0.0);
        let primary = signals.get(BART).copied().unwrap_or(0.0);

        if negative >= self.config.strong_signal {
            let severity = if primary >= self.config.strong_signal {
                ConflictSeverity::Critical
            } else {
                ConflictSeverity::Warning
            };
            Some(DetectedConflict {
                kind: ConflictType::IronyVsSentiment,
                severity,
                models_involved: vec![IRONY.into(), SENTIMENT.into()],
                magnitude: irony_p.min(negative),
                description: format!(
                    "strong negativity ({negative:.2}) with high irony ({irony_p:.2}): possible sarcasm"
                ),
            })
        } else if primary >= self.config.strong_signal {
            Some(DetectedConflict {
                kind: ConflictType::IronyVsSentiment,
                severity: ConflictSeverity::Critical,
                models_involved: vec![IRONY.into(), BART.into()],
                magnitude: irony_p.min(primary),
                description: format!(
                    "strong crisis signal ({primary:.2}) with high irony ({irony_p:.2}): possible sarcasm"
                ),
            })
        } else {
            None
        }
    }

    /// Rule 3: primary and crisis emotions disagree.
    fn emotion_vs_crisis(&self, signals: &BTreeMap<String, f64>) -> Option<DetectedConflict> {
        let primary = signals.get(BART).copied()?;
        let emotions = signals.get(EMOTIONS).copied()?;

        let crisis_without_emotion =
            primary >= self.config.strong_signal && emotions <= self.config.weak_emotion;
        let emotion_without_crisis =
            emotions >= self.config.strong_signal && primary <= self.config.weak_emotion;
        if !crisis_without_emotion && !emotion_without_crisis {
            return None;
        }

        Some(DetectedConflict {
            kind: ConflictType::EmotionVsCrisis,
            severity: ConflictSeverity::Warning,
            models_involved: vec![BART.into(), EMOTIONS.into()],
            magnitude: (primary - emotions).abs(),
            description: if crisis_without_emotion {
                format!(
                    "strong crisis signal ({primary:.2}) without crisis-correlated emotions ({emotions:.2})"
                )
            } else {
                format!(
                    "strong crisis emotions ({emotions:.2}) without a crisis classification ({primary:.2})"
                )
            },
        })
    }

    /// Rule 4: top labels map to incompatible buckets.
    fn label_mismatch(&self, results: &[ModelResult]) -> Option<DetectedConflict> {
        let mut bucketed: Vec<(&str, &str)> = Vec::new();
        for result in results.iter().filter(|r| r.success) {
            if let Some(bucket) = self.config.label_buckets.get(&result.label) {
                bucketed.push((result.model_name.as_str(), bucket.as_str()));
            }
        }
        if bucketed.len() < 2 {
            return None;
        }
        let first_bucket = bucketed[0].1;
        if bucketed.iter().all(|(_, b)| *b == first_bucket) {
            return None;
        }

        let crisis_count = bucketed.iter().filter(|(_, b)| *b == "crisis").count();
        let minority = crisis_count.min(bucketed.len() - crisis_count);
        Some(DetectedConflict {
            kind: ConflictType::LabelMismatch,
            severity: ConflictSeverity::Warning,
            models_involved: bucketed.iter().map(|(m, _)| m.to_string()).collect(),
            magnitude: minority as f64 / bucketed.len() as f64,
            description: format!(
                "top labels disagree across buckets: {}",
                bucketed
                    .iter()
                    .map(|(m, b)| format!("{m}→{b}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }
}
