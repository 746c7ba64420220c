//! Alerter hook for critical ensemble conflicts.
//!
//! The resolver fires an asynchronous, fire-and-forget notification when it
//! sees a critical conflict. Delivery (Discord webhook, pager, ...) is an
//! external collaborator; the core only defines the callback seam and a
//! no-op default.

use crate::types::{ConflictSeverity, DetectedConflict};
use async_trait::async_trait;
use std::sync::Mutex;

/// Payload handed to an alerter when conflicts require attention.
#[derive(Debug, Clone)]
pub struct ConflictAlert {
    /// Request correlation id, when available.
    pub request_id: Option<String>,
    /// Highest severity among the conflicts below.
    pub severity: ConflictSeverity,
    pub conflicts: Vec<DetectedConflict>,
}

/// Receives conflict alerts. Implementations must not block resolution;
/// the resolver spawns alerts onto the runtime and never awaits delivery.
#[async_trait]
pub trait ConflictAlerter: Send + Sync {
    async fn alert(&self, alert: ConflictAlert);
}

/// Default alerter: drops everything.
pub struct NoopAlerter;

#[async_trait]
impl ConflictAlerter for NoopAlerter {
    async fn alert(&self, _alert: ConflictAlert) {}
}

/// Test alerter that records every alert it receives.
pub struct RecordingAlerter {
    received: Mutex<Vec<ConflictAlert>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<ConflictAlert> {
        self.received.lock().unwrap().clone()
    }
}

impl Default for RecordingAlerter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConflictAlerter for RecordingAlerter {
    async fn alert(&self, alert: ConflictAlert) {
        self.received.lock().unwrap().push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConflictType;

    #[tokio::test]
    async fn test_recording_alerter_captures() {
        let alerter = RecordingAlerter::new();
        alerter
            .alert(ConflictAlert {
                request_id: Some("req-1".into()),
                severity: ConflictSeverity::Critical,
                conflicts: vec![DetectedConflict {
                    kind: ConflictType::ScoreSpread,
                    severity: ConflictSeverity::Critical,
                    models_involved: vec!["bart".into()],
                    magnitude: 0.8,
                    description: "spread".into(),
                }],
            })
            .await;
        let received = alerter.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_noop_alerter_accepts() {
        NoopAlerter
            .alert(ConflictAlert {
                request_id: None,
                severity: ConflictSeverity::Warning,
                conflicts: vec![],
            })
            .await;
    }
}
