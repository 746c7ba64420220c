//! Deterministic, templated explanations for assessments.
//!
//! No model writes this text: the generator walks the assembled
//! [`CrisisAssessment`] and renders it at one of three verbosities. Given
//! the same assessment and verbosity, the output is byte-identical.

use crate::config::SeverityThresholds;
use crate::models::IRONY;
use crate::types::{
    CrisisAssessment, EscalationKind, ModelContribution, RiskServiceStatus, TimeOfDayRisk,
    TrendDirection, Verbosity,
};

/// Renders human-readable explanations.
pub struct ExplanationGenerator {
    thresholds: SeverityThresholds,
}

impl ExplanationGenerator {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    /// Render the explanation for an assembled assessment.
    pub fn render(&self, assessment: &CrisisAssessment, verbosity: Verbosity) -> String {
        match verbosity {
            Verbosity::Minimal => self.minimal(assessment),
            Verbosity::Standard => self.standard(assessment),
            Verbosity::Detailed => self.detailed(assessment),
        }
    }

    fn minimal(&self, a: &CrisisAssessment) -> String {
        let mut line = match dominant_contribution(&a.signals) {
            Some(top) => format!(
                "Severity {} (score {:.2}), driven mainly by the {} model.",
                a.severity, a.crisis_score, top.model_name
            ),
            None => format!("Severity {} (score {:.2}).", a.severity, a.crisis_score),
        };
        if a.is_degraded {
            line.push_str(" Assessment is degraded: not all models were available.");
        }
        line
    }

    fn standard(&self, a: &CrisisAssessment) -> String {
        let mut lines = vec![format!(
            "Severity {} with score {:.2} (confidence {:.2}), consensus {} / agreement {}.",
            a.severity, a.crisis_score, a.confidence, a.consensus.algorithm, a.consensus.agreement
        )];

        for c in sorted_contributions(&a.signals) {
            if c.model_name == IRONY {
                if c.signal < 1.0 {
                    lines.push(format!(
                        "- irony ({}) dampened the score: P(ironic) = {:.2}",
                        c.role,
                        1.0 - c.signal
                    ));
                }
            } else {
                lines.push(format!(
                    "- {} ({}): signal {:.2}, weighted contribution {:.2}",
                    c.model_name, c.role, c.signal, c.weighted
                ));
            }
        }

        if let Some(conflicts) = &a.conflicts {
            lines.push(format!(
                "Conflicts detected: {}.",
                conflicts
                    .conflicts
                    .iter()
                    .map(|c| c.description.clone())
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
        }

        if let Some(ctx) = &a.context {
            let mut highlights = Vec::new();
            if ctx.escalation.kind != EscalationKind::None {
                highlights.push(format!("{} escalation", ctx.escalation.kind));
            }
            if ctx.temporal.time_of_day_risk == TimeOfDayRisk::LateNight {
                highlights.push("late-night posting".to_string());
            }
            if ctx.temporal.rapid_posting {
                highlights.push("rapid posting".to_string());
            }
            if ctx.trend.direction != TrendDirection::Stable {
                highlights.push(format!("{} trend", ctx.trend.direction));
            }
            if !highlights.is_empty() {
                lines.push(format!(
                    "Context: {} (urgency {}).",
                    highlights.join(", "),
                    ctx.urgency
                ));
            }
        }

        if a.is_degraded {
            lines.push("Degraded: one or more models were unavailable for this request.".into());
        }

        lines.join("\n")
    }

    fn detailed(&self, a: &CrisisAssessment) -> String {
        let mut lines = vec![self.standard(a)];

        lines.push(format!(
            "Thresholds: critical ≥ {:.2}, high ≥ {:.2}, medium ≥ {:.2}, low ≥ {:.2}; score {:.2} classifies as {}.",
            self.thresholds.critical,
            self.thresholds.high,
            self.thresholds.medium,
            self.thresholds.low,
            a.crisis_score,
            a.severity
        ));

        let raw: Vec<String> = a
            .signals
            .iter()
            .map(|c| format!("{}={:.3}", c.model_name, c.signal))
            .collect();
        if !raw.is_empty() {
            lines.push(format!("Raw signals: {}.", raw.join(", ")));
        }

        if let Some(external) = &a.external_risk {
            match external.status {
                RiskServiceStatus::Applied => lines.push(format!(
                    "External risk model applied: {} ({:.2}) raised {:.2} to {:.2}.",
                    external.risk_label.as_deref().unwrap_or("unknown"),
                    external.risk_score.unwrap_or(0.0),
                    external.pre_amplification.unwrap_or(0.0),
                    external.amplified.unwrap_or(0.0)
                )),
                RiskServiceStatus::Unavailable => {
                    lines.push("External risk model was unavailable; base score used.".into())
                }
                RiskServiceStatus::Skipped => {
                    lines.push("External risk model skipped by the decision gate.".into())
                }
                RiskServiceStatus::Disabled => {}
            }
        }

        if let Some(resolution) = &a.resolution {
            lines.push(format!(
                "Resolution ({}): {}",
                resolution.strategy, resolution.rationale
            ));
        }

        lines.push(format!(
            "Decision: crisis_detected={}, requires_intervention={}, requires_review={}, action={}.",
            a.crisis_detected, a.requires_intervention, a.requires_review, a.recommended_action
        ));

        lines.join("\n")
    }
}

fn sorted_contributions(signals: &[ModelContribution]) -> Vec<&ModelContribution> {
    let mut sorted: Vec<&ModelContribution> = signals.iter().collect();
    sorted.sort_by(|a, b| b.weighted.total_cmp(&a.weighted));
    sorted
}

fn dominant_contribution(signals: &[ModelContribution]) -> Option<&ModelContribution> {
    signals.iter().max_by(|a, b| a.weighted.total_cmp(&b.weighted))
}

/// Quick check used by tests and the status surface: does an assessment's
/// explanation mention degradation when it should?
pub fn mentions_degradation(a: &CrisisAssessment) -> bool {
    !a.is_degraded || a.explanation.to_lowercase().contains("degraded")
}
