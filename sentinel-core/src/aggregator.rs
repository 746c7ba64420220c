//! Result aggregation: assembles the final [`CrisisAssessment`] and makes
//! the intervention decisions.
//!
//! The aggregator is deliberately dumb about models: it only combines the
//! records produced upstream and applies the decision table:
//!
//! - `crisis_detected` when severity reaches low.
//! - `requires_review` from consensus, resolution, or an unavailable risk
//!   service at medium+ severity; review always implies at-least-elevated
//!   intervention.
//! - `recommended_action` from the urgency/severity table.

use crate::types::{
    ConflictReport, ConsensusResult, ContextAnalysisResult, CrisisAssessment,
    ExternalRiskOutcome, InterventionUrgency, ModelContribution, RecommendedAction,
    ResolutionResult, RiskServiceStatus, Severity,
};

/// Everything upstream stages produced for one request.
pub struct AssessmentParts {
    pub crisis_score: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub contributions: Vec<ModelContribution>,
    pub consensus: ConsensusResult,
    pub conflicts: Option<ConflictReport>,
    pub resolution: Option<ResolutionResult>,
    pub context: Option<ContextAnalysisResult>,
    pub external_risk: Option<ExternalRiskOutcome>,
    pub models_used: Vec<String>,
    pub is_degraded: bool,
    pub processing_time_ms: u64,
}

/// Assembles assessments from parts.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Combine the parts into the final boundary value. The explanation is
    /// rendered afterwards, from the assembled assessment.
    pub fn assemble(&self, parts: AssessmentParts) -> CrisisAssessment {
        let severity = parts.severity;

        let external_unavailable = parts
            .external_risk
            .as_ref()
            .is_some_and(|r| r.status == RiskServiceStatus::Unavailable);
        let requires_review = parts.consensus.requires_review
            || parts.resolution.as_ref().is_some_and(|r| r.requires_review)
            || (external_unavailable && severity >= Severity::Medium);

        let urgency = effective_urgency(severity, parts.context.as_ref(), requires_review);

        let crisis_detected = severity >= Severity::Low;
        let requires_intervention =
            urgency >= InterventionUrgency::Elevated || requires_review || severity >= Severity::High;
        let recommended_action = recommended_action(urgency, severity);

        CrisisAssessment {
            crisis_detected,
            severity,
            confidence: parts.confidence.clamp(0.0, 1.0),
            crisis_score: parts.crisis_score.clamp(0.0, 1.0),
            requires_intervention,
            requires_review,
            recommended_action,
            signals: parts.contributions,
            consensus: parts.consensus,
            conflicts: parts.conflicts.filter(|c| !c.is_empty()),
            resolution: parts.resolution,
            context: parts.context,
            explanation: String::new(),
            processing_time_ms: parts.processing_time_ms,
            models_used: parts.models_used,
            is_degraded: parts.is_degraded,
            external_risk: parts.external_risk,
        }
    }
}

/// Urgency used for the decision table: the context analyzer's verdict when
/// available, otherwise derived from severity; review floors it at
/// elevated.
fn effective_urgency(
    severity: Severity,
    context: Option<&ContextAnalysisResult>,
    requires_review: bool,
) -> InterventionUrgency {
    let base = match context {
        Some(ctx) => ctx.urgency,
        None => match severity {
            s if s >= Severity::Medium => InterventionUrgency::Elevated,
            Severity::Low => InterventionUrgency::Routine,
            _ => InterventionUrgency::None,
        },
    };
    if requires_review {
        base.max(InterventionUrgency::Elevated)
    } else {
        base
    }
}

/// Fixed urgency × severity action table.
fn recommended_action(urgency: InterventionUrgency, severity: Severity) -> RecommendedAction {
    match urgency {
        InterventionUrgency::Immediate => RecommendedAction::ImmediateIntervention,
        InterventionUrgency::Urgent => RecommendedAction::PriorityResponse,
        InterventionUrgency::Elevated => {
            if severity >= Severity::High {
                RecommendedAction::PriorityResponse
            } else {
                RecommendedAction::Acknowledge
            }
        }
        InterventionUrgency::Routine => RecommendedAction::Monitor,
        InterventionUrgency::None => {
            if severity >= Severity::Low {
                RecommendedAction::Monitor
            } else {
                RecommendedAction::Ignore
            }
        }
    }
}
