//! Configuration facade for the Sentinel engine.
//!
//! Uses `figment` for layered configuration: built-in defaults -> optional
//! `sentinel.toml` -> `SENTINEL_*` environment variables. Every tunable the
//! pipeline reads lives here; components receive the sections they need at
//! construction and never consult hidden globals. `EngineConfig::validate`
//! rejects partial or inconsistent configurations up front, which is what
//! makes the engine's atomic `reload_config` safe.

use crate::error::ConfigError;
use crate::types::{ConsensusAlgorithm, ResolutionStrategy, Severity, Verbosity};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Weight-sum tolerance for enabled models.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Top-level configuration for the Sentinel engine and server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub thresholds: SeverityThresholds,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub external_risk: ExternalRiskConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl EngineConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `SENTINEL_*` environment variables (`__` separates nesting).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: EngineConfig = figment
            .merge(Env::prefixed("SENTINEL_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants. Called on load and on reload.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.models.bart.enabled {
            return Err(ConfigError::Invalid {
                message: "the primary model (bart) cannot be disabled".into(),
            });
        }

        let sum: f64 = self.models.enabled_weights().values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum {
                sum,
                tolerance: WEIGHT_SUM_TOLERANCE,
            });
        }

        self.thresholds.validate()?;

        for (name, value) in [
            ("scoring.irony_alpha", self.scoring.irony_alpha),
            ("external_risk.beta", self.external_risk.beta),
            ("external_risk.skip_threshold", self.external_risk.skip_threshold),
            ("fallback.primary_ceiling", self.fallback.primary_ceiling),
            ("context.temporal_modifier_cap", self.context.temporal_modifier_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must lie in [0, 1], got {value}"),
                });
            }
        }

        if !is_valid_time_format(&self.context.late_night_start)
            || !is_valid_time_format(&self.context.late_night_end)
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "late-night window must use HH:MM, got {}..{}",
                    self.context.late_night_start, self.context.late_night_end
                ),
            });
        }

        if self.context.max_history == 0 {
            return Err(ConfigError::Invalid {
                message: "context.max_history must be at least 1".into(),
            });
        }

        if self.concurrency.max_workers == 0 || self.concurrency.load_workers == 0 {
            return Err(ConfigError::Invalid {
                message: "concurrency worker counts must be at least 1".into(),
            });
        }

        for pattern in &self.context.patterns {
            if pattern.pattern.is_none() && pattern.min_rise.is_none() {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "escalation pattern '{}' needs a regex or a score-shape criterion",
                        pattern.name
                    ),
                });
            }
            if let Some(regex) = &pattern.pattern {
                regex::Regex::new(regex).map_err(|e| ConfigError::Invalid {
                    message: format!("escalation pattern '{}' is not valid: {e}", pattern.name),
                })?;
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Configuration of a single model wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Static ensemble weight. Must sum to 1.0 with the other enabled models.
    pub weight: f64,
    /// Model revision pin, forwarded to the serving backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Serving endpoint. Absent selects the in-process lexicon backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// The four-wrapper ensemble plus the label sets the wrappers score against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub bart: ModelConfig,
    pub sentiment: ModelConfig,
    pub irony: ModelConfig,
    pub emotions: ModelConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            bart: ModelConfig {
                enabled: true,
                weight: 0.50,
                revision: None,
                endpoint: None,
            },
            sentiment: ModelConfig {
                enabled: true,
                weight: 0.25,
                revision: None,
                endpoint: None,
            },
            irony: ModelConfig {
                enabled: true,
                weight: 0.15,
                revision: None,
                endpoint: None,
            },
            emotions: ModelConfig {
                enabled: true,
                weight: 0.10,
                revision: None,
                endpoint: None,
            },
            labels: LabelsConfig::default(),
        }
    }
}

impl ModelsConfig {
    /// Config entry for a model by wrapper name.
    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        match name {
            "bart" => Some(&self.bart),
            "sentiment" => Some(&self.sentiment),
            "irony" => Some(&self.irony),
            "emotions" => Some(&self.emotions),
            _ => None,
        }
    }

    /// Static weights of the enabled models, keyed by wrapper name.
    pub fn enabled_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for (name, cfg) in [
            ("bart", &self.bart),
            ("sentiment", &self.sentiment),
            ("irony", &self.irony),
            ("emotions", &self.emotions),
        ] {
            if cfg.enabled {
                weights.insert(name.to_string(), cfg.weight);
            }
        }
        weights
    }
}

/// Label sets used by the zero-shot wrappers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Crisis classes for the primary zero-shot classifier.
    pub crisis: Vec<String>,
    /// Non-crisis classes for the primary zero-shot classifier.
    pub safe: Vec<String>,
    /// Emotion categories scored by the emotions wrapper.
    pub emotions: Vec<String>,
    /// Subset of `emotions` that correlates with crisis.
    pub crisis_emotions: Vec<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            crisis: vec![
                "suicidal ideation".into(),
                "self-harm".into(),
                "emotional distress".into(),
                "depression".into(),
            ],
            safe: vec!["safe".into(), "casual conversation".into()],
            emotions: vec![
                "sadness".into(),
                "fear".into(),
                "anger".into(),
                "grief".into(),
                "despair".into(),
                "joy".into(),
                "neutral".into(),
            ],
            crisis_emotions: vec![
                "sadness".into(),
                "fear".into(),
                "anger".into(),
                "grief".into(),
                "despair".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds & scoring
// ---------------------------------------------------------------------------

/// Ordered severity thresholds over the fused crisis score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical: 0.85,
            high: 0.70,
            medium: 0.50,
            low: 0.30,
        }
    }
}

impl SeverityThresholds {
    /// Map a score to its severity band. Thresholds are inclusive lower
    /// bounds, so a score exactly at a boundary lands in the higher band.
    pub fn classify(&self, score: f64) -> Severity {
        if score >= self.critical {
            Severity::Critical
        } else if score >= self.high {
            Severity::High
        } else if score >= self.medium {
            Severity::Medium
        } else if score >= self.low {
            Severity::Low
        } else {
            Severity::Safe
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.critical > self.high
            && self.high > self.medium
            && self.medium > self.low
            && self.low > 0.0
            && self.critical <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::ThresholdOrder {
                message: format!(
                    "critical {} > high {} > medium {} > low {} > 0 required",
                    self.critical, self.high, self.medium, self.low
                ),
            })
        }
    }
}

/// Weighted-scorer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Irony dampening strength α: final = base × (1 − α × P(ironic)).
    pub irony_alpha: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { irony_alpha: 0.6 }
    }
}

// ---------------------------------------------------------------------------
// Consensus / conflict / resolver
// ---------------------------------------------------------------------------

/// Consensus-layer defaults and agreement bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub default_algorithm: ConsensusAlgorithm,
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Signal variance at or below this is strong agreement.
    pub strong_variance: f64,
    /// Signal variance at or below this is moderate agreement.
    pub moderate_variance: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_algorithm: ConsensusAlgorithm::Weighted,
            verbosity: Verbosity::Standard,
            strong_variance: 0.02,
            moderate_variance: 0.08,
        }
    }
}

/// Conflict-detector tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Minimum max−min signal spread that registers a conflict.
    pub spread_threshold: f64,
    /// Spread at or above this escalates the conflict to critical.
    pub critical_threshold: f64,
    /// Signal considered "strong" for the cross-model rules.
    pub strong_signal: f64,
    /// Crisis-emotion sum considered "weak" for the emotion rule.
    pub weak_emotion: f64,
    /// Top-label to bucket mapping used by the label-mismatch rule.
    pub label_buckets: BTreeMap<String, String>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        let mut label_buckets = BTreeMap::new();
        for label in [
            "suicidal ideation",
            "self-harm",
            "emotional distress",
            "depression",
            "sadness",
            "fear",
            "grief",
            "despair",
            "negative",
        ] {
            label_buckets.insert(label.to_string(), "crisis".to_string());
        }
        for label in [
            "safe",
            "casual conversation",
            "joy",
            "neutral",
            "positive",
        ] {
            label_buckets.insert(label.to_string(), "safe".to_string());
        }
        Self {
            spread_threshold: 0.5,
            critical_threshold: 0.75,
            strong_signal: 0.7,
            weak_emotion: 0.2,
            label_buckets,
        }
    }
}

/// Conflict-resolver defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
}

// ---------------------------------------------------------------------------
// External risk client
// ---------------------------------------------------------------------------

/// Circuit-breaker tunables shared by the risk client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: usize,
    /// Seconds the breaker stays open before probing.
    pub open_secs: u64,
    /// Probes permitted while half-open.
    pub half_open_probes: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_secs: 60,
            half_open_probes: 1,
        }
    }
}

/// External risk-amplification client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRiskConfig {
    pub enabled: bool,
    /// Base URL of the remote risk service.
    pub base_url: String,
    /// Scores at or above this skip the remote call entirely.
    pub skip_threshold: f64,
    /// Call the service below medium severity as well.
    pub amplify_low: bool,
    /// Amplification strength β: min(1, base + β·risk·(1−base)).
    pub beta: f64,
    /// Total per-call timeout in seconds.
    pub timeout_s: f64,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Default for ExternalRiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://127.0.0.1:8881".into(),
            skip_threshold: 0.80,
            amplify_low: false,
            beta: 0.5,
            timeout_s: 2.0,
            breaker: BreakerConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback strategy
// ---------------------------------------------------------------------------

/// Per-model failure tracking and weight redistribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Decayed failure count that trips a model's breaker.
    pub failure_threshold: f64,
    /// Half-life of the failure counter, in seconds.
    pub half_life_secs: u64,
    /// Seconds a tripped breaker short-circuits calls.
    pub cooldown_secs: u64,
    /// Ceiling on the primary's redistributed weight share.
    pub primary_ceiling: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3.0,
            half_life_secs: 300,
            cooldown_secs: 60,
            primary_ceiling: 0.70,
        }
    }
}

// ---------------------------------------------------------------------------
// Context analyzer
// ---------------------------------------------------------------------------

/// A named escalation pattern matched over message text and/or the shape
/// of the score sequence. At least one criterion must be given; when both
/// are given, both must hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPatternConfig {
    pub name: String,
    /// Case-insensitive regex applied to the current message and history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Score-shape criterion: a cumulative rise of at least this much...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rise: Option<f64>,
    /// ...within this many minutes (unbounded when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_minutes: Option<i64>,
    /// Contribution of a match to pattern confidence, in [0, 1].
    pub weight: f64,
}

/// Context-history analyzer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub enabled: bool,
    /// Oldest entries beyond this are trimmed before analysis.
    pub max_history: usize,
    /// Local-time start of the late-night window (HH:MM).
    pub late_night_start: String,
    /// Local-time end of the late-night window (HH:MM).
    pub late_night_end: String,
    /// Message count that qualifies as rapid posting...
    pub rapid_posting_k: usize,
    /// ...within this many minutes.
    pub rapid_posting_window_min: i64,
    /// Number of most-recent scored entries the trend regression uses.
    pub trend_window_n: usize,
    /// Slope magnitude (per message) separating stable from a trend.
    pub trend_epsilon: f64,
    /// Delta standard deviation above which the trend is volatile.
    pub trend_volatility: f64,
    /// Cap on the additive temporal risk modifier.
    pub temporal_modifier_cap: f64,
    /// Modifier contributed by a late-night message.
    pub late_night_modifier: f64,
    /// Modifier contributed by rapid posting.
    pub rapid_posting_modifier: f64,
    /// Modifier contributed by weekend timing.
    pub weekend_modifier: f64,
    /// Temporal modifier at or above which urgency is raised to elevated.
    pub temporal_urgency_threshold: f64,
    /// Score delta that marks an intervention point.
    pub attention_delta: f64,
    /// Weight of the rate classifier vs pattern matches in confidence.
    pub rate_confidence_weight: f64,
    /// Named escalation pattern library.
    pub patterns: Vec<EscalationPatternConfig>,
    /// Trend velocity at or above which a worsening trend is urgent.
    pub velocity_urgent: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history: 50,
            late_night_start: "22:00".into(),
            late_night_end: "04:00".into(),
            rapid_posting_k: 5,
            rapid_posting_window_min: 10,
            trend_window_n: 6,
            trend_epsilon: 0.02,
            trend_volatility: 0.15,
            temporal_modifier_cap: 0.15,
            late_night_modifier: 0.10,
            rapid_posting_modifier: 0.05,
            weekend_modifier: 0.02,
            temporal_urgency_threshold: 0.10,
            attention_delta: 0.15,
            rate_confidence_weight: 0.7,
            patterns: default_escalation_patterns(),
            velocity_urgent: 0.05,
        }
    }
}

fn default_escalation_patterns() -> Vec<EscalationPatternConfig> {
    vec![
        EscalationPatternConfig {
            name: "hopelessness".into(),
            pattern: Some(r"(?i)\b(no (point|reason)|can'?t (go on|do this anymore)|giv(e|ing) up|hopeless|worthless)\b".into()),
            min_rise: None,
            within_minutes: None,
            weight: 0.6,
        },
        EscalationPatternConfig {
            name: "farewell".into(),
            pattern: Some(r"(?i)\b(goodbye forever|last (message|night|time)|won'?t (be|see) (here|you)|end it)\b".into()),
            min_rise: None,
            within_minutes: None,
            weight: 0.9,
        },
        EscalationPatternConfig {
            name: "acute-distress".into(),
            pattern: Some(r"(?i)\b(breakdown|panic(king)?|overwhelmed|can'?t breathe|emergency)\b".into()),
            min_rise: None,
            within_minutes: None,
            weight: 0.5,
        },
        EscalationPatternConfig {
            name: "compounding-rise".into(),
            pattern: None,
            min_rise: Some(0.35),
            within_minutes: Some(120),
            weight: 0.5,
        },
    ]
}

// ---------------------------------------------------------------------------
// Cache / timeouts / concurrency / server
// ---------------------------------------------------------------------------

/// Response-cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl_s: 300,
        }
    }
}

/// Inference time budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Per-model inference timeout, seconds.
    pub per_model_s: f64,
    /// Whole-request timeout, seconds.
    pub global_s: f64,
    /// Per-model warmup timeout, seconds.
    pub warmup_s: f64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            per_model_s: 2.0,
            global_s: 5.0,
            warmup_s: 30.0,
        }
    }
}

/// Worker bounds for inference and loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Bound on concurrent model inferences.
    pub max_workers: usize,
    /// Bound on concurrent model loads (GPU memory pressure).
    pub load_workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4),
            load_workers: 2,
        }
    }
}

/// HTTP bind configuration for the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8871,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Check if a string is a valid HH:MM time format.
pub(crate) fn is_valid_time_format(s: &str) -> bool {
    if s.len() != 5 {
        return false;
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return false;
    }
    match (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
        (Ok(h), Ok(m)) => h < 24 && m < 60,
        _ => false,
    }
}

/// Parse an HH:MM string into (hour, minute). Callers validate first.
pub(crate) fn parse_hh_mm(s: &str) -> (u32, u32) {
    let mut parts = s.split(':');
    let h = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let m = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (h, m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let config = EngineConfig::default();
        let sum: f64 = config.models.enabled_weights().values().sum();
        assert!((sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_weight_sum_violation_rejected() {
        let mut config = EngineConfig::default();
        config.models.bart.weight = 0.9;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::WeightSum { .. }));
    }

    #[test]
    fn test_disabled_model_excluded_from_weights() {
        let mut config = EngineConfig::default();
        config.models.irony.enabled = false;
        let weights = config.models.enabled_weights();
        assert!(!weights.contains_key("irony"));
        assert_eq!(weights.len(), 3);
    }

    #[test]
    fn test_primary_cannot_be_disabled() {
        let mut config = EngineConfig::default();
        config.models.bart.enabled = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("primary"));
    }

    #[test]
    fn test_threshold_classification() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify(0.0), Severity::Safe);
        assert_eq!(t.classify(0.29), Severity::Safe);
        assert_eq!(t.classify(0.30), Severity::Low);
        assert_eq!(t.classify(0.50), Severity::Medium);
        assert_eq!(t.classify(0.69), Severity::Medium);
        assert_eq!(t.classify(0.70), Severity::High);
        assert_eq!(t.classify(0.85), Severity::Critical);
        assert_eq!(t.classify(1.0), Severity::Critical);
    }

    #[test]
    fn test_threshold_order_enforced() {
        let mut config = EngineConfig::default();
        config.thresholds.medium = 0.75; // above high
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ThresholdOrder { .. }));
    }

    #[test]
    fn test_alpha_bounds_enforced() {
        let mut config = EngineConfig::default();
        config.scoring.irony_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_late_night_window_format_enforced() {
        let mut config = EngineConfig::default();
        config.context.late_night_start = "25:00".into();
        assert!(config.validate().is_err());
        config.context.late_night_start = "2200".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = EngineConfig::default();
        config.context.patterns.push(EscalationPatternConfig {
            name: "broken".into(),
            pattern: Some("(unclosed".into()),
            min_rise: None,
            within_minutes: None,
            weight: 0.5,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pattern_needs_some_criterion() {
        let mut config = EngineConfig::default();
        config.context.patterns.push(EscalationPatternConfig {
            name: "empty".into(),
            pattern: None,
            min_rise: None,
            within_minutes: None,
            weight: 0.5,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("score-shape"));
    }

    #[test]
    fn test_is_valid_time_format() {
        assert!(is_valid_time_format("22:00"));
        assert!(is_valid_time_format("04:30"));
        assert!(!is_valid_time_format("4:30"));
        assert!(!is_valid_time_format("22:60"));
        assert!(!is_valid_time_format("24:00"));
    }

    #[test]
    fn test_parse_hh_mm() {
        assert_eq!(parse_hh_mm("22:00"), (22, 0));
        assert_eq!(parse_hh_mm("04:15"), (4, 15));
    }

    #[test]
    fn test_load_from_toml_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.toml");
        std::fs::write(
            &path,
            r#"
[scoring]
irony_alpha = 0.4

[cache]
enabled = true
max_size = 250
ttl_s = 60
"#,
        )
        .unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert!((config.scoring.irony_alpha - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.cache.max_size, 250);
        // Untouched sections keep their defaults.
        assert!((config.models.bart.weight - 0.50).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/sentinel.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_label_buckets_cover_default_labels() {
        let conflict = ConflictConfig::default();
        let labels = LabelsConfig::default();
        for label in labels.crisis.iter().chain(labels.safe.iter()) {
            assert!(
                conflict.label_buckets.contains_key(label),
                "bucket missing for {label}"
            );
        }
    }
}
