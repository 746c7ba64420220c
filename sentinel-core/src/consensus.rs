//! Consensus layer: four selectable voting algorithms over the ensemble.
//!
//! - `weighted` (default) — trusts the scorer's fusion; agreement is
//!   classified from signal variance.
//! - `majority` — binary votes; ties defer to human review.
//! - `unanimous` — crisis only when every enabled successful model votes
//!   crisis; dissent yields a no-crisis decision but flags review when any
//!   model voted crisis.
//! - `conflict_aware` — weighted voting that defers to review whenever the
//!   conflict detector found a critical disagreement.

use crate::config::ConsensusConfig;
use crate::scoring::{ScoreBreakdown, confidence_from};
use crate::types::{
    AgreementLevel, ConflictReport, ConsensusAlgorithm, ConsensusResult, ModelVote,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Chooses and runs a consensus algorithm.
pub struct ConsensusSelector {
    config: ConsensusConfig,
    /// Signal at or above the low severity threshold counts as a crisis vote.
    crisis_vote_threshold: f64,
}

impl ConsensusSelector {
    pub fn new(config: ConsensusConfig, crisis_vote_threshold: f64) -> Self {
        Self {
            config,
            crisis_vote_threshold,
        }
    }

    /// The configured default algorithm.
    pub fn default_algorithm(&self) -> ConsensusAlgorithm {
        self.config.default_algorithm
    }

    /// Run `algorithm` over the fused breakdown.
    ///
    /// `fused_score` is the engine's current crisis score (post
    /// amplification and dampening); `conflicts` is consulted only by the
    /// conflict-aware algorithm.
    pub fn select(
        &self,
        algorithm: ConsensusAlgorithm,
        breakdown: &ScoreBreakdown,
        fused_score: f64,
        conflicts: Option<&ConflictReport>,
    ) -> ConsensusResult {
        let votes = self.cast_votes(&breakdown.signals);
        let result = match algorithm {
            ConsensusAlgorithm::Weighted => self.weighted(breakdown, fused_score, votes),
            ConsensusAlgorithm::Majority => self.majority(breakdown, fused_score, votes),
            ConsensusAlgorithm::Unanimous => self.unanimous(breakdown, fused_score, votes),
            ConsensusAlgorithm::ConflictAware => {
                let mut inner = self.weighted(breakdown, fused_score, votes);
                inner.algorithm = ConsensusAlgorithm::ConflictAware;
                if conflicts.is_some_and(|c| c.has_critical()) {
                    inner.requires_review = true;
                }
                inner
            }
        };
        debug!(
            algorithm = %result.algorithm,
            agreement = %result.agreement,
            final_score = result.final_score,
            requires_review = result.requires_review,
            "Consensus computed"
        );
        result
    }

    fn cast_votes(&self, signals: &BTreeMap<String, f64>) -> Vec<ModelVote> {
        signals
            .iter()
            .map(|(name, signal)| ModelVote {
                model_name: name.clone(),
                voted_crisis: *signal >= self.crisis_vote_threshold,
                signal: *signal,
            })
            .collect()
    }

    fn weighted(
        &self,
        breakdown: &ScoreBreakdown,
        fused_score: f64,
        votes: Vec<ModelVote>,
    ) -> ConsensusResult {
        let variance = variance_of(&breakdown.signals);
        let all_same_side = !votes.is_empty()
            && (votes.iter().all(|v| v.voted_crisis) || votes.iter().all(|v| !v.voted_crisis));
        let agreement = if all_same_side {
            AgreementLevel::Unanimous
        } else if variance <= self.config.strong_variance {
            AgreementLevel::Strong
        } else if variance <= self.config.moderate_variance {
            AgreementLevel::Moderate
        } else {
            AgreementLevel::Weak
        };

        ConsensusResult {
            algorithm: ConsensusAlgorithm::Weighted,
            agreement,
            final_score: fused_score,
            confidence: breakdown.confidence,
            votes,
            requires_review: false,
        }
    }

    fn majority(
        &self,
        breakdown: &ScoreBreakdown,
        fused_score: f64,
        votes: Vec<ModelVote>,
    ) -> ConsensusResult {
        let total = votes.len();
        let crisis_votes = votes.iter().filter(|v| v.voted_crisis).count();
        let tie = total > 0 && crisis_votes * 2 == total;

        let share = if total == 0 {
            0.0
        } else {
            let majority = crisis_votes.max(total - crisis_votes);
            majority as f64 / total as f64
        };
        let agreement = if total == 0 || tie {
            AgreementLevel::None
        } else if share >= 1.0 {
            AgreementLevel::Unanimous
        } else if share >= 0.75 {
            AgreementLevel::Strong
        } else {
            AgreementLevel::Moderate
        };

        ConsensusResult {
            algorithm: ConsensusAlgorithm::Majority,
            agreement,
            final_score: fused_score,
            confidence: confidence_from(share, breakdown.max_signal),
            votes,
            requires_review: tie,
        }
    }

    fn unanimous(
        &self,
        breakdown: &ScoreBreakdown,
        fused_score: f64,
        votes: Vec<ModelVote>,
    ) -> ConsensusResult {
        let any_crisis = votes.iter().any(|v| v.voted_crisis);
        let all_crisis = !votes.is_empty() && votes.iter().all(|v| v.voted_crisis);

        // On dissent the decision falls to the weakest signal, which by
        // construction sits below the crisis vote threshold; any crisis
        // vote still forces review (safety-first on ambiguity).
        let (final_score, agreement, requires_review) = if all_crisis || !any_crisis {
            let agreement = if votes.is_empty() {
                AgreementLevel::None
            } else {
                AgreementLevel::Unanimous
            };
            (fused_score, agreement, false)
        } else {
            let min_signal = votes
                .iter()
                .map(|v| v.signal)
                .fold(f64::INFINITY, f64::min)
                .min(fused_score);
            (min_signal, AgreementLevel::Weak, true)
        };

        ConsensusResult {
            algorithm: ConsensusAlgorithm::Unanimous,
            agreement,
            final_score,
            confidence: breakdown.confidence,
            votes,
            requires_review,
        }
    }
}

fn variance_of(signals: &BTreeMap<String, f64>) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let n = signals.len() as f64;
    let mean = signals.values().sum::<f64>() / n;
    signals.values().map(|s| (s - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelsConfig;
    use crate::scoring::WeightedScorer;
    use crate::types::{
        ConflictSeverity, ConflictType, DetectedConflict, ModelResult, ModelRole,
    };

    fn breakdown_from(signals: &[(&str, f64)]) -> ScoreBreakdown {
        // Build results whose extracted signals equal the requested values.
        let results: Vec<ModelResult> = signals
            .iter()
            .map(|(name, signal)| {
                let (role, scores): (ModelRole, Vec<(String, f64)>) = match *name {
                    "bart" => (
                        ModelRole::Primary,
                        vec![("suicidal ideation".into(), *signal)],
                    ),
                    "sentiment" => (ModelRole::Secondary, vec![("negative".into(), *signal)]),
                    "irony" => (ModelRole::Tertiary, vec![("ironic".into(), 1.0 - *signal)]),
                    _ => (ModelRole::Supplementary, vec![("sadness".into(), *signal)]),
                };
                let mut map = std::collections::BTreeMap::new();
                for (l, s) in scores {
                    map.insert(l, s);
                }
                ModelResult::success(*name, role, map, 1)
            })
            .collect();
        let mut weights = std::collections::BTreeMap::new();
        weights.insert("bart".to_string(), 0.50);
        weights.insert("sentiment".to_string(), 0.25);
        weights.insert("irony".to_string(), 0.15);
        weights.insert("emotions".to_string(), 0.10);
        WeightedScorer::new(LabelsConfig::default(), 0.6).score(&results, &weights)
    }

    fn selector() -> ConsensusSelector {
        ConsensusSelector::new(ConsensusConfig::default(), 0.30)
    }

    #[test]
    fn test_weighted_unanimous_when_all_signal() {
        let b = breakdown_from(&[("bart", 0.8), ("sentiment", 0.75), ("emotions", 0.7)]);
        let result = selector().select(ConsensusAlgorithm::Weighted, &b, 0.77, None);
        assert_eq!(result.agreement, AgreementLevel::Unanimous);
        assert!((result.final_score - 0.77).abs() < 1e-9);
        assert!(!result.requires_review);
    }

    #[test]
    fn test_weighted_strong_vs_weak_by_variance() {
        // Mixed votes but tiny variance around the threshold: strong.
        let tight = breakdown_from(&[("bart", 0.31), ("sentiment", 0.29), ("emotions", 0.30)]);
        let result = selector().select(ConsensusAlgorithm::Weighted, &tight, 0.3, None);
        assert_eq!(result.agreement, AgreementLevel::Strong);

        let wild = breakdown_from(&[("bart", 0.9), ("sentiment", 0.1), ("emotions", 0.5)]);
        let result = selector().select(ConsensusAlgorithm::Weighted, &wild, 0.55, None);
        assert_eq!(result.agreement, AgreementLevel::Weak);
    }

    #[test]
    fn test_majority_carries_crisis() {
        let b = breakdown_from(&[("bart", 0.8), ("sentiment", 0.6), ("emotions", 0.1)]);
        let result = selector().select(ConsensusAlgorithm::Majority, &b, 0.6, None);
        assert_eq!(result.algorithm, ConsensusAlgorithm::Majority);
        assert!(!result.requires_review);
        assert_eq!(result.votes.iter().filter(|v| v.voted_crisis).count(), 2);
        assert_eq!(result.agreement, AgreementLevel::Moderate);
    }

    #[test]
    fn test_majority_tie_defers_to_review() {
        let b = breakdown_from(&[("bart", 0.8), ("sentiment", 0.1)]);
        let result = selector().select(ConsensusAlgorithm::Majority, &b, 0.5, None);
        assert!(result.requires_review);
        assert_eq!(result.agreement, AgreementLevel::None);
    }

    #[test]
    fn test_unanimous_all_crisis() {
        let b = breakdown_from(&[("bart", 0.8), ("sentiment", 0.7), ("emotions", 0.6)]);
        let result = selector().select(ConsensusAlgorithm::Unanimous, &b, 0.72, None);
        assert_eq!(result.agreement, AgreementLevel::Unanimous);
        assert!((result.final_score - 0.72).abs() < 1e-9);
        assert!(!result.requires_review);
    }

    #[test]
    fn test_unanimous_dissent_is_no_crisis_with_review() {
        let b = breakdown_from(&[("bart", 0.9), ("sentiment", 0.05), ("emotions", 0.8)]);
        let result = selector().select(ConsensusAlgorithm::Unanimous, &b, 0.7, None);
        assert!(result.requires_review);
        // Final score collapses to the dissenting signal: below the vote
        // threshold, so no crisis is reported.
        assert!(result.final_score < 0.30);
    }

    #[test]
    fn test_unanimous_all_quiet_is_clean_no_crisis() {
        let b = breakdown_from(&[("bart", 0.1), ("sentiment", 0.05), ("emotions", 0.1)]);
        let result = selector().select(ConsensusAlgorithm::Unanimous, &b, 0.08, None);
        assert!(!result.requires_review);
        assert_eq!(result.agreement, AgreementLevel::Unanimous);
    }

    #[test]
    fn test_conflict_aware_without_critical_matches_weighted() {
        let b = breakdown_from(&[("bart", 0.6), ("sentiment", 0.55), ("emotions", 0.5)]);
        let report = ConflictReport::default();
        let result = selector().select(ConsensusAlgorithm::ConflictAware, &b, 0.57, Some(&report));
        assert_eq!(result.algorithm, ConsensusAlgorithm::ConflictAware);
        assert!(!result.requires_review);
    }

    #[test]
    fn test_conflict_aware_critical_forces_review() {
        let b = breakdown_from(&[("bart", 0.9), ("sentiment", 0.1)]);
        let report = ConflictReport {
            conflicts: vec![DetectedConflict {
                kind: ConflictType::ScoreSpread,
                severity: ConflictSeverity::Critical,
                models_involved: vec!["bart".into(), "sentiment".into()],
                magnitude: 0.8,
                description: "spread".into(),
            }],
        };
        let result = selector().select(ConsensusAlgorithm::ConflictAware, &b, 0.6, Some(&report));
        assert!(result.requires_review);
    }

    #[test]
    fn test_votes_respect_threshold_boundary() {
        let b = breakdown_from(&[("bart", 0.30), ("sentiment", 0.2999)]);
        let result = selector().select(ConsensusAlgorithm::Weighted, &b, 0.3, None);
        let bart = result.votes.iter().find(|v| v.model_name == "bart").unwrap();
        let sentiment = result
            .votes
            .iter()
            .find(|v| v.model_name == "sentiment")
            .unwrap();
        assert!(bart.voted_crisis);
        assert!(!sentiment.voted_crisis);
    }
}
