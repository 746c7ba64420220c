//! Boundary records and shared enums for the Sentinel decision engine.
//!
//! Every component boundary in the pipeline is an explicit record type:
//! [`ModelResult`] out of the wrappers, [`EnsembleScore`] out of the scorer,
//! [`ConsensusResult`] out of the voting layer, [`ConflictReport`] and
//! [`ResolutionResult`] out of conflict handling, [`ContextAnalysisResult`]
//! out of the history analyzer, and [`CrisisAssessment`] at the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Severity & urgency orderings
// ---------------------------------------------------------------------------

/// Crisis severity derived from the fused score via ordered thresholds.
///
/// The derive order gives `Safe < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Safe => "safe",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// How urgently a moderator should act on the message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum InterventionUrgency {
    #[default]
    None,
    Routine,
    Elevated,
    Urgent,
    Immediate,
}

impl fmt::Display for InterventionUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterventionUrgency::None => "none",
            InterventionUrgency::Routine => "routine",
            InterventionUrgency::Elevated => "elevated",
            InterventionUrgency::Urgent => "urgent",
            InterventionUrgency::Immediate => "immediate",
        };
        write!(f, "{s}")
    }
}

/// Action the consuming moderation bot is advised to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Ignore,
    Monitor,
    Acknowledge,
    PriorityResponse,
    ImmediateIntervention,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendedAction::Ignore => "ignore",
            RecommendedAction::Monitor => "monitor",
            RecommendedAction::Acknowledge => "acknowledge",
            RecommendedAction::PriorityResponse => "priority_response",
            RecommendedAction::ImmediateIntervention => "immediate_intervention",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Model layer records
// ---------------------------------------------------------------------------

/// Role tier of a model wrapper. The primary model's failure is fatal for a
/// request; the other tiers degrade gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Primary,
    Secondary,
    Tertiary,
    Supplementary,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelRole::Primary => "primary",
            ModelRole::Secondary => "secondary",
            ModelRole::Tertiary => "tertiary",
            ModelRole::Supplementary => "supplementary",
        };
        write!(f, "{s}")
    }
}

/// Output of a single model wrapper. Immutable once produced.
///
/// Wrappers never raise out of `analyze`; failures arrive as
/// `success = false` with a populated `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    /// Wrapper name ("bart", "sentiment", "irony", "emotions").
    pub model_name: String,
    /// Role tier of the producing wrapper.
    pub role: ModelRole,
    /// Top-1 label for this model's task.
    pub label: String,
    /// Confidence of the top label, in [0, 1].
    pub score: f64,
    /// Full label distribution (ordered map for deterministic output).
    pub all_scores: BTreeMap<String, f64>,
    /// Wall-clock inference latency.
    pub latency_ms: u64,
    /// Whether inference succeeded.
    pub success: bool,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResult {
    /// Build a successful result from a label distribution.
    ///
    /// The top label is the distribution's argmax; ties break toward the
    /// lexicographically smaller label for determinism.
    pub fn success(
        model_name: impl Into<String>,
        role: ModelRole,
        all_scores: BTreeMap<String, f64>,
        latency_ms: u64,
    ) -> Self {
        let (label, score) = all_scores
            .iter()
            .fold((String::new(), f64::MIN), |(best_l, best_s), (l, s)| {
                if *s > best_s {
                    (l.clone(), *s)
                } else {
                    (best_l, best_s)
                }
            });
        Self {
            model_name: model_name.into(),
            role,
            label,
            score: score.max(0.0),
            all_scores,
            latency_ms,
            success: true,
            error: None,
        }
    }

    /// Build a failure result carrying the error description.
    pub fn failure(
        model_name: impl Into<String>,
        role: ModelRole,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            role,
            label: String::new(),
            score: 0.0,
            all_scores: BTreeMap::new(),
            latency_ms,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Score of a specific label, 0.0 when absent.
    pub fn label_score(&self, label: &str) -> f64 {
        self.all_scores.get(label).copied().unwrap_or(0.0)
    }
}

/// A single model's audit entry in the fused score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelContribution {
    pub model_name: String,
    pub role: ModelRole,
    /// Effective (post-redistribution) weight used for this request.
    pub weight: f64,
    /// Crisis signal extracted from the model output, in [0, 1].
    pub signal: f64,
    /// `weight × signal` for additive models; 0.0 for the dampening model.
    pub weighted: f64,
}

/// Fused ensemble output: score, confidence, severity, and attributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleScore {
    /// Final crisis score in [0, 1].
    pub crisis_score: f64,
    /// Ensemble confidence in [0, 1].
    pub confidence: f64,
    /// Severity derived from `crisis_score` via the configured thresholds.
    pub severity: Severity,
    /// Per-model weighted contributions, for audit.
    pub contributions: Vec<ModelContribution>,
}

// ---------------------------------------------------------------------------
// Consensus records
// ---------------------------------------------------------------------------

/// Selectable consensus algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAlgorithm {
    #[default]
    Weighted,
    Majority,
    Unanimous,
    ConflictAware,
}

impl fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsensusAlgorithm::Weighted => "weighted",
            ConsensusAlgorithm::Majority => "majority",
            ConsensusAlgorithm::Unanimous => "unanimous",
            ConsensusAlgorithm::ConflictAware => "conflict_aware",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConsensusAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(ConsensusAlgorithm::Weighted),
            "majority" => Ok(ConsensusAlgorithm::Majority),
            "unanimous" => Ok(ConsensusAlgorithm::Unanimous),
            "conflict_aware" => Ok(ConsensusAlgorithm::ConflictAware),
            other => Err(format!("unknown consensus algorithm: {other}")),
        }
    }
}

/// How strongly the models agree with the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    None,
    Weak,
    Moderate,
    Strong,
    Unanimous,
}

impl fmt::Display for AgreementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgreementLevel::None => "none",
            AgreementLevel::Weak => "weak",
            AgreementLevel::Moderate => "moderate",
            AgreementLevel::Strong => "strong",
            AgreementLevel::Unanimous => "unanimous",
        };
        write!(f, "{s}")
    }
}

/// One model's binary decision within a vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVote {
    pub model_name: String,
    /// Whether this model's signal cleared the crisis threshold.
    pub voted_crisis: bool,
    /// The signal that decided the vote.
    pub signal: f64,
}

/// Outcome of the consensus layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub algorithm: ConsensusAlgorithm,
    pub agreement: AgreementLevel,
    pub final_score: f64,
    pub confidence: f64,
    pub votes: Vec<ModelVote>,
    /// Set when the algorithm defers the decision to a human.
    pub requires_review: bool,
}

// ---------------------------------------------------------------------------
// Conflict records
// ---------------------------------------------------------------------------

/// The disagreement patterns the detector recognizes, in rule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ScoreSpread,
    IronyVsSentiment,
    EmotionVsCrisis,
    LabelMismatch,
}

/// Severity of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Info,
    Warning,
    Critical,
}

/// One disagreement found between ensemble models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedConflict {
    pub kind: ConflictType,
    pub severity: ConflictSeverity,
    pub models_involved: Vec<String>,
    /// Rule-specific magnitude (e.g. the score spread) in [0, 1].
    pub magnitude: f64,
    pub description: String,
}

/// Ordered list of detected conflicts (deterministic by rule id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<DetectedConflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Highest severity present, if any conflicts were found.
    pub fn max_severity(&self) -> Option<ConflictSeverity> {
        self.conflicts.iter().map(|c| c.severity).max()
    }

    pub fn has_critical(&self) -> bool {
        self.max_severity() == Some(ConflictSeverity::Critical)
    }

    /// Whether any conflict is at warning severity or above.
    pub fn has_warning_or_above(&self) -> bool {
        self.max_severity()
            .is_some_and(|s| s >= ConflictSeverity::Warning)
    }
}

/// Strategy applied by the conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Safety-first: take the highest model signal.
    #[default]
    Conservative,
    /// Take the lowest model signal; never applied on critical conflicts.
    Optimistic,
    /// Arithmetic mean of signals.
    Mean,
    /// Keep the scorer's value and defer to human review.
    ReviewFlag,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionStrategy::Conservative => "conservative",
            ResolutionStrategy::Optimistic => "optimistic",
            ResolutionStrategy::Mean => "mean",
            ResolutionStrategy::ReviewFlag => "review_flag",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(ResolutionStrategy::Conservative),
            "optimistic" => Ok(ResolutionStrategy::Optimistic),
            "mean" => Ok(ResolutionStrategy::Mean),
            "review_flag" => Ok(ResolutionStrategy::ReviewFlag),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}

/// Outcome of conflict resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub strategy: ResolutionStrategy,
    pub resolved_score: f64,
    pub requires_review: bool,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Context analysis records
// ---------------------------------------------------------------------------

/// Rate-of-change classification over the history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    #[default]
    None,
    Rapid,
    Gradual,
    Sudden,
}

impl fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscalationKind::None => "none",
            EscalationKind::Rapid => "rapid",
            EscalationKind::Gradual => "gradual",
            EscalationKind::Sudden => "sudden",
        };
        write!(f, "{s}")
    }
}

/// Escalation detector output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAssessment {
    pub kind: EscalationKind,
    /// Cumulative score change over the window.
    pub rate: f64,
    /// Name of the matched named pattern, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub confidence: f64,
    /// Indices (into the scored series) where a delta crossed the attention
    /// threshold.
    pub intervention_points: Vec<usize>,
}

/// Time-of-day classification for the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDayRisk {
    #[default]
    Normal,
    LateNight,
}

/// Temporal detector output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAssessment {
    pub time_of_day_risk: TimeOfDayRisk,
    /// Whether `k` messages landed within the rapid-posting window.
    pub rapid_posting: bool,
    /// Messages per minute over the observed window (0.0 without history).
    pub posting_frequency: f64,
    pub weekend: bool,
    /// Additive urgency modifier in [0, cap]. Never applied to the score.
    pub risk_modifier: f64,
}

/// Direction of the fitted score trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Worsening,
    #[default]
    Stable,
    Improving,
    Volatile,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Worsening => "worsening",
            TrendDirection::Stable => "stable",
            TrendDirection::Improving => "improving",
            TrendDirection::Volatile => "volatile",
        };
        write!(f, "{s}")
    }
}

/// Trend analyzer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub direction: TrendDirection,
    /// Absolute regression slope, per message.
    pub velocity: f64,
    /// Indices where the smoothed delta changed sign.
    pub inflection_points: Vec<usize>,
}

/// Combined context-history analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAnalysisResult {
    pub escalation: EscalationAssessment,
    pub temporal: TemporalAssessment,
    pub trend: TrendAssessment,
    pub urgency: InterventionUrgency,
    /// Non-fatal issues found while validating the supplied history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<String>,
    /// Smoothed score series used for trend analysis (debugging aid).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smoothed_series: Vec<f64>,
}

// ---------------------------------------------------------------------------
// External risk records
// ---------------------------------------------------------------------------

/// Outcome category of the external risk-amplification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskServiceStatus {
    /// The remote verdict was applied to the score.
    Applied,
    /// The decision gate skipped the call.
    Skipped,
    /// The service failed or its breaker is open.
    Unavailable,
    /// The client is disabled by configuration.
    Disabled,
}

/// Record of the external risk-amplification step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRiskOutcome {
    pub status: RiskServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_label: Option<String>,
    /// Score before amplification, for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_amplification: Option<f64>,
    /// Score after amplification (capped at 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplified: Option<f64>,
}

// ---------------------------------------------------------------------------
// Request & assessment
// ---------------------------------------------------------------------------

/// Explanation verbosity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Minimal,
    #[default]
    Standard,
    Detailed,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verbosity::Minimal => "minimal",
            Verbosity::Standard => "standard",
            Verbosity::Detailed => "detailed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(Verbosity::Minimal),
            "standard" => Ok(Verbosity::Standard),
            "detailed" => Ok(Verbosity::Detailed),
            other => Err(format!("unknown verbosity: {other}")),
        }
    }
}

/// One prior message supplied by the caller, oldest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// The caller's prior crisis score for this message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis_score: Option<f64>,
}

/// An analysis request. The current message is never part of `history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// IANA timezone name for temporal analysis; UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<ConsensusAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
}

impl AnalyzeRequest {
    /// Minimal request over a bare message, defaults elsewhere.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            channel_id: None,
            timezone: None,
            history: Vec::new(),
            algorithm: None,
            verbosity: None,
        }
    }
}

/// The final assessment returned to the moderation bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisAssessment {
    pub crisis_detected: bool,
    pub severity: Severity,
    pub confidence: f64,
    pub crisis_score: f64,
    pub requires_intervention: bool,
    pub requires_review: bool,
    pub recommended_action: RecommendedAction,
    /// Per-model attributions for the fused score.
    pub signals: Vec<ModelContribution>,
    pub consensus: ConsensusResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<ConflictReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextAnalysisResult>,
    pub explanation: String,
    pub processing_time_ms: u64,
    pub models_used: Vec<String>,
    /// True when one or more non-primary models were unavailable, or when
    /// the primary itself failed and a structured fallback was returned.
    pub is_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_risk: Option<ExternalRiskOutcome>,
}
