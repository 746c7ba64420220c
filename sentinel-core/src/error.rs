//! Error types for the Sentinel decision engine.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering model inference, configuration, validation, the external risk
//! client, and engine orchestration. Component boundaries return these as
//! `Result` values; only the HTTP layer translates them into status codes.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Top-level error type for the Sentinel core library.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Risk client error: {0}")]
    RiskClient(#[from] RiskClientError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from model wrappers and the inference transport.
///
/// Wrappers never let these escape `analyze`; they fold them into a
/// `ModelResult` with `success = false`. The loader and backends surface
/// them directly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Model '{model}' is not loaded")]
    NotLoaded { model: String },

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Model '{model}' is disabled by configuration")]
    Disabled { model: String },

    #[error("Inference request failed for '{model}': {message}")]
    Inference { model: String, message: String },

    #[error("Inference for '{model}' timed out after {timeout_ms}ms")]
    InferenceTimeout { model: String, timeout_ms: u64 },

    #[error("Backend returned an empty distribution for '{model}'")]
    EmptyDistribution { model: String },

    #[error("Warmup failed for '{model}': {message}")]
    WarmupFailed { model: String, message: String },
}

impl ModelError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Timeouts and transport failures are transient; configuration and
    /// registry problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Inference { .. } | ModelError::InferenceTimeout { .. }
        )
    }
}

/// Errors from the configuration facade.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: std::path::PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Enabled model weights sum to {sum:.3}, expected 1.0 ± {tolerance}")]
    WeightSum { sum: f64, tolerance: f64 },

    #[error("Severity thresholds must be strictly ordered: {message}")]
    ThresholdOrder { message: String },

    #[error("Configuration parse error: {message}")]
    Parse { message: String },
}

/// Request-level validation failures, surfaced to callers as 4xx.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Message exceeds {max} characters (got {got})")]
    MessageTooLong { max: usize, got: usize },

    #[error("History timestamps are not strictly increasing at index {index}")]
    HistoryNotMonotonic { index: usize },

    #[error("Unknown consensus algorithm: {value}")]
    UnknownAlgorithm { value: String },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    /// The request field this failure is attributed to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::EmptyMessage | ValidationError::MessageTooLong { .. } => "message",
            ValidationError::HistoryNotMonotonic { .. } => "history",
            ValidationError::UnknownAlgorithm { .. } => "algorithm",
            ValidationError::InvalidField { field, .. } => field,
        }
    }
}

/// Errors from the external risk-amplification client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RiskClientError {
    #[error("Risk service request failed: {message}")]
    Request { message: String },

    #[error("Risk service returned HTTP {status}")]
    Status { status: u16 },

    #[error("Risk service response could not be parsed: {message}")]
    Parse { message: String },

    #[error("Risk service call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Risk service circuit breaker is open")]
    CircuitOpen,

    #[error("Risk client is disabled by configuration")]
    Disabled,
}

impl RiskClientError {
    /// Transient failures are retried once; client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            RiskClientError::Request { .. } | RiskClientError::Timeout { .. } => true,
            RiskClientError::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors from the decision engine orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Distinguished control-flow signal: the primary model is unavailable.
    /// The engine converts this into a degraded assessment, never a crash.
    #[error("Critical model failure for '{model}': {message}")]
    CriticalModelFailure { model: String, message: String },

    #[error("Engine is not ready: primary model not loaded")]
    NotReady,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request exceeded the global timeout of {timeout_ms}ms")]
    GlobalTimeout { timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}
