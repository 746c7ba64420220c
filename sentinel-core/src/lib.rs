//! # Sentinel Core
//!
//! Ensemble decision engine for crisis-detection triage in chat
//! communities. Four classifiers (zero-shot crisis, sentiment, irony,
//! emotions) are fused by a weighted scorer with irony dampening, passed
//! through consensus voting and conflict resolution, enriched with
//! context-history analysis, optionally amplified by a remote risk model,
//! and rendered into an explainable [`types::CrisisAssessment`].

pub mod aggregator;
pub mod alerting;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod consensus;
pub mod context;
pub mod engine;
pub mod error;
pub mod explanation;
pub mod fallback;
pub mod http;
pub mod models;
pub mod retry;
pub mod risk_client;
pub mod scoring;
pub mod types;

// Re-export the types most callers need at the crate root.
pub use alerting::{ConflictAlert, ConflictAlerter, NoopAlerter, RecordingAlerter};
pub use config::EngineConfig;
pub use engine::{DecisionEngine, EngineStatus, ModelInfo};
pub use error::{
    ConfigError, EngineError, ModelError, Result, RiskClientError, SentinelError, ValidationError,
};
pub use http::router;
pub use models::loader::ModelLoader;
pub use models::{CrisisModel, backend::InferenceBackend};
pub use types::{
    AnalyzeRequest, ConsensusAlgorithm, CrisisAssessment, HistoryItem, InterventionUrgency,
    ModelResult, ModelRole, RecommendedAction, Severity, Verbosity,
};
