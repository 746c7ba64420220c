//! Context-history analysis: escalation, temporal risk, trend, and the
//! intervention urgency they imply.
//!
//! Stateless by design: the caller supplies the history on every request,
//! oldest first, without the current message. The validator runs before any
//! detector: empty texts are dropped, duplicate timestamps coalesce to the
//! latest item, a non-monotonic sequence is a request-level error, and the
//! window is capped to the configured length.

pub mod escalation;
pub mod temporal;
pub mod trend;

use crate::config::ContextConfig;
use crate::error::ValidationError;
use crate::types::{
    ContextAnalysisResult, EscalationKind, HistoryItem, InterventionUrgency, Severity,
    TrendDirection,
};
use chrono::{DateTime, Utc};
use escalation::EscalationDetector;
use temporal::TemporalDetector;
use tracing::debug;
use trend::TrendAnalyzer;

/// Outcome of history validation.
#[derive(Debug)]
pub struct ValidatedHistory {
    pub items: Vec<HistoryItem>,
    pub issues: Vec<String>,
}

/// Normalizes caller-supplied history before analysis.
pub struct HistoryValidator {
    max_history: usize,
}

impl HistoryValidator {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
        }
    }

    /// Validate and normalize. Returns an error only for timestamps that
    /// remain out of order after coalescing duplicates.
    pub fn validate(&self, history: &[HistoryItem]) -> Result<ValidatedHistory, ValidationError> {
        let mut issues = Vec::new();

        let mut items: Vec<HistoryItem> = Vec::with_capacity(history.len());
        let mut dropped_empty = 0usize;
        for item in history {
            if item.text.trim().is_empty() {
                dropped_empty += 1;
                continue;
            }
            items.push(item.clone());
        }
        if dropped_empty > 0 {
            issues.push(format!("dropped {dropped_empty} history items with empty text"));
        }

        // Coalesce equal timestamps, keeping the latest occurrence.
        let mut coalesced: Vec<HistoryItem> = Vec::with_capacity(items.len());
        let mut coalesced_count = 0usize;
        for item in items {
            match coalesced.last() {
                Some(last) if last.timestamp == item.timestamp => {
                    *coalesced.last_mut().unwrap() = item;
                    coalesced_count += 1;
                }
                _ => coalesced.push(item),
            }
        }
        if coalesced_count > 0 {
            issues.push(format!("coalesced {coalesced_count} duplicate timestamps"));
        }

        for (index, pair) in coalesced.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ValidationError::HistoryNotMonotonic { index: index + 1 });
            }
        }

        if coalesced.len() > self.max_history {
            let trimmed = coalesced.len() - self.max_history;
            coalesced.drain(..trimmed);
            issues.push(format!("trimmed {trimmed} oldest items beyond the history cap"));
        }

        Ok(ValidatedHistory {
            items: coalesced,
            issues,
        })
    }
}

/// Composes the three detectors and derives intervention urgency.
pub struct ContextAnalyzer {
    enabled: bool,
    validator: HistoryValidator,
    escalation: EscalationDetector,
    temporal: TemporalDetector,
    trend: TrendAnalyzer,
    velocity_urgent: f64,
    temporal_urgency_threshold: f64,
}

impl ContextAnalyzer {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            enabled: config.enabled,
            validator: HistoryValidator::new(config.max_history),
            escalation: EscalationDetector::new(config),
            temporal: TemporalDetector::new(config),
            trend: TrendAnalyzer::new(config),
            velocity_urgent: config.velocity_urgent,
            temporal_urgency_threshold: config.temporal_urgency_threshold,
        }
    }

    /// Analyze the current message in its history context.
    ///
    /// Temporal factors apply even to a bare message; escalation and trend
    /// only see whatever scored history survives validation. Returns
    /// `Ok(None)` when analysis is disabled; returns a validation error for
    /// malformed history.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze(
        &self,
        current_text: &str,
        current_score: f64,
        current_severity: Severity,
        timezone: Option<&str>,
        history: &[HistoryItem],
        now: DateTime<Utc>,
    ) -> Result<Option<ContextAnalysisResult>, ValidationError> {
        if !self.enabled {
            return Ok(None);
        }
        let validated = self.validator.validate(history)?;
        if validated.items.is_empty() && !history.is_empty() {
            debug!("No history survived validation");
        }

        // Scored series: prior items that carry a score, plus the current
        // message.
        let mut series: Vec<(DateTime<Utc>, f64)> = validated
            .items
            .iter()
            .filter_map(|item| item.crisis_score.map(|s| (item.timestamp, s.clamp(0.0, 1.0))))
            .collect();
        series.push((now, current_score.clamp(0.0, 1.0)));

        let mut texts: Vec<&str> = validated.items.iter().map(|i| i.text.as_str()).collect();
        texts.push(current_text);

        let escalation = self.escalation.detect(&series, &texts);
        let temporal = self.temporal.detect(now, timezone, &validated.items);
        let scores: Vec<f64> = series.iter().map(|(_, s)| *s).collect();
        let trend = self.trend.analyze(&scores);
        let smoothed_series = trend::smooth(&scores);

        let urgency = self.urgency(
            current_score,
            current_severity,
            escalation.kind,
            trend.direction,
            trend.velocity,
            temporal.risk_modifier,
        );

        Ok(Some(ContextAnalysisResult {
            escalation,
            temporal,
            trend,
            urgency,
            validation_issues: validated.issues,
            smoothed_series,
        }))
    }

    /// Priority-ordered urgency rules; the first match wins.
    fn urgency(
        &self,
        current_score: f64,
        severity: Severity,
        escalation: EscalationKind,
        trend: TrendDirection,
        velocity: f64,
        temporal_modifier: f64,
    ) -> InterventionUrgency {
        if escalation == EscalationKind::Rapid && severity >= Severity::Medium {
            return InterventionUrgency::Immediate;
        }
        if escalation == EscalationKind::Sudden && current_score >= 0.7 {
            return InterventionUrgency::Immediate;
        }
        let worsening_fast = trend == TrendDirection::Worsening && velocity >= self.velocity_urgent;
        if matches!(escalation, EscalationKind::Rapid | EscalationKind::Gradual) || worsening_fast {
            return InterventionUrgency::Urgent;
        }
        if temporal_modifier >= self.temporal_urgency_threshold && severity >= Severity::Low {
            return InterventionUrgency::Elevated;
        }
        match severity {
            s if s >= Severity::Medium => InterventionUrgency::Elevated,
            Severity::Low => InterventionUrgency::Routine,
            _ => InterventionUrgency::None,
        }
    }
}
