//! Conflict resolution.
//!
//! Applies one of four strategies to a conflicted assessment. Conservative
//! is the default: for a triage system it is better to over-alert than to
//! miss a crisis. Critical conflicts additionally fire an asynchronous
//! alert through the injected [`ConflictAlerter`]; delivery is
//! fire-and-forget and never blocks resolution.

use crate::alerting::{ConflictAlert, ConflictAlerter};
use crate::types::{ConflictReport, ConflictSeverity, ResolutionResult, ResolutionStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies resolution strategies and raises alerts.
pub struct ConflictResolver {
    default_strategy: ResolutionStrategy,
    alerter: Arc<dyn ConflictAlerter>,
}

impl ConflictResolver {
    pub fn new(default_strategy: ResolutionStrategy, alerter: Arc<dyn ConflictAlerter>) -> Self {
        Self {
            default_strategy,
            alerter,
        }
    }

    /// The configured default strategy.
    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default_strategy
    }

    /// Resolve a conflicted score.
    ///
    /// `fused_score` is the scorer's (dampened) value; `signals` are the
    /// per-model crisis signals the strategies draw from. Deterministic for
    /// a given strategy; the alert side effect is spawned, not awaited.
    pub fn resolve(
        &self,
        strategy: Option<ResolutionStrategy>,
        fused_score: f64,
        signals: &BTreeMap<String, f64>,
        report: &ConflictReport,
        request_id: Option<&str>,
    ) -> ResolutionResult {
        let requested = strategy.unwrap_or(self.default_strategy);

        if report.has_critical() {
            self.fire_alert(report, request_id);
        }

        if !report.has_warning_or_above() {
            return ResolutionResult {
                strategy: requested,
                resolved_score: fused_score,
                requires_review: false,
                rationale: "no conflicts at warning severity or above".into(),
            };
        }

        // Optimistic resolution is never allowed to wave away a critical
        // disagreement; it downgrades to a review flag.
        let effective = if requested == ResolutionStrategy::Optimistic && report.has_critical() {
            warn!("Optimistic resolution requested on a critical conflict, deferring to review");
            ResolutionStrategy::ReviewFlag
        } else {
            requested
        };

        let max_signal = signals.values().copied().fold(0.0_f64, f64::max);
        let min_signal = signals
            .values()
            .copied()
            .fold(f64::INFINITY, f64::min)
            .min(1.0);
        let mean_signal = if signals.is_empty() {
            fused_score
        } else {
            signals.values().sum::<f64>() / signals.len() as f64
        };

        let result = match effective {
            ResolutionStrategy::Conservative => ResolutionResult {
                strategy: effective,
                resolved_score: max_signal.max(fused_score),
                requires_review: false,
                rationale: format!(
                    "conflicts present; safety-first resolution takes the strongest signal ({max_signal:.2})"
                ),
            },
            ResolutionStrategy::Optimistic => ResolutionResult {
                strategy: effective,
                resolved_score: if signals.is_empty() { fused_score } else { min_signal },
                requires_review: false,
                rationale: format!(
                    "conflicts present; optimistic resolution takes the weakest signal ({min_signal:.2})"
                ),
            },
            ResolutionStrategy::Mean => ResolutionResult {
                strategy: effective,
                resolved_score: mean_signal,
                requires_review: false,
                rationale: format!(
                    "conflicts present; resolved to the mean signal ({mean_signal:.2})"
                ),
            },
            ResolutionStrategy::ReviewFlag => ResolutionResult {
                strategy: effective,
                resolved_score: fused_score,
                requires_review: true,
                rationale: "conflicts present; score kept and flagged for human review".into(),
            },
        };

        info!(
            strategy = %result.strategy,
            resolved_score = result.resolved_score,
            requires_review = result.requires_review,
            conflicts = report.conflicts.len(),
            "Conflict resolved"
        );
        result
    }

    fn fire_alert(&self, report: &ConflictReport, request_id: Option<&str>) {
        let alert = ConflictAlert {
            request_id: request_id.map(String::from),
            severity: report.max_severity().unwrap_or(ConflictSeverity::Critical),
            conflicts: report.conflicts.clone(),
        };
        let alerter = self.alerter.clone();
        tokio::spawn(async move {
            alerter.alert(alert).await;
        });
    }
}
