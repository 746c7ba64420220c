//! Escalation detection over the scored history window.
//!
//! Classifies the rate of change of crisis scores (rapid / gradual /
//! sudden), matches the configured named pattern library against message
//! text, and marks the indices where a delta crossed the attention
//! threshold.

use crate::config::{ContextConfig, EscalationPatternConfig};
use crate::types::{EscalationAssessment, EscalationKind};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::debug;

/// Cumulative rise that qualifies as rapid escalation within one hour.
const RAPID_CUMULATIVE: f64 = 0.4;
/// Minimum single-step rise required for the rapid classification.
const RAPID_STEP: f64 = 0.15;
/// Cumulative rise that qualifies as gradual escalation within a day.
const GRADUAL_CUMULATIVE: f64 = 0.3;
/// Dip tolerated by the gradual classification's monotonicity check.
const GRADUAL_DIP: f64 = 0.05;
/// Single-step rise that qualifies as sudden escalation on its own.
const SUDDEN_STEP: f64 = 0.4;

/// A compiled named pattern: a text regex, a score-shape criterion, or
/// both (both must hold when both are given).
struct CompiledPattern {
    name: String,
    regex: Option<Regex>,
    min_rise: Option<f64>,
    within_minutes: Option<i64>,
    weight: f64,
}

impl CompiledPattern {
    fn matches(&self, series: &[(DateTime<Utc>, f64)], texts: &[&str]) -> bool {
        if let Some(regex) = &self.regex {
            if !texts.iter().any(|t| regex.is_match(t)) {
                return false;
            }
        }
        if let Some(min_rise) = self.min_rise {
            if max_rise_within(series, self.within_minutes) < min_rise {
                return false;
            }
        }
        true
    }
}

/// Largest score rise between any chronological pair, optionally bounded
/// to pairs no further apart than `window_minutes`.
fn max_rise_within(series: &[(DateTime<Utc>, f64)], window_minutes: Option<i64>) -> f64 {
    let mut best: f64 = 0.0;
    for (i, (t_start, s_start)) in series.iter().enumerate() {
        for (t_end, s_end) in &series[i + 1..] {
            if let Some(window) = window_minutes {
                if *t_end - *t_start > Duration::minutes(window) {
                    continue;
                }
            }
            best = best.max(s_end - s_start);
        }
    }
    best
}

/// Classifies escalation from scores and text.
pub struct EscalationDetector {
    attention_delta: f64,
    rate_confidence_weight: f64,
    patterns: Vec<CompiledPattern>,
}

impl EscalationDetector {
    /// Build from configuration. Invalid patterns were rejected by config
    /// validation; any that slip through are skipped here.
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            attention_delta: config.attention_delta,
            rate_confidence_weight: config.rate_confidence_weight.clamp(0.0, 1.0),
            patterns: compile_patterns(&config.patterns),
        }
    }

    /// Classify escalation over `series` (chronological `(timestamp, score)`
    /// pairs, current message last). `texts` holds history texts plus the
    /// current message for pattern matching.
    pub fn detect(
        &self,
        series: &[(DateTime<Utc>, f64)],
        texts: &[&str],
    ) -> EscalationAssessment {
        let deltas = deltas_of(series);
        let (kind, rate, rate_confidence) = self.classify_rate(series, &deltas);
        let (pattern, pattern_confidence) = self.match_patterns(series, texts);

        let w = self.rate_confidence_weight;
        let confidence = (w * rate_confidence + (1.0 - w) * pattern_confidence).clamp(0.0, 1.0);

        let intervention_points: Vec<usize> = deltas
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= self.attention_delta)
            .map(|(i, _)| i + 1)
            .collect();

        debug!(
            kind = %kind,
            rate,
            confidence,
            pattern = pattern.as_deref().unwrap_or("-"),
            points = intervention_points.len(),
            "Escalation classified"
        );

        EscalationAssessment {
            kind,
            rate,
            pattern,
            confidence,
            intervention_points,
        }
    }

    fn classify_rate(
        &self,
        series: &[(DateTime<Utc>, f64)],
        deltas: &[f64],
    ) -> (EscalationKind, f64, f64) {
        if series.len() < 2 {
            return (EscalationKind::None, 0.0, 0.5);
        }
        let cumulative = series.last().unwrap().1 - series.first().unwrap().1;
        let elapsed = series.last().unwrap().0 - series.first().unwrap().0;
        let max_step = deltas.iter().copied().fold(f64::MIN, f64::max);

        let rapid = cumulative >= RAPID_CUMULATIVE
            && elapsed <= Duration::hours(1)
            && max_step >= RAPID_STEP;
        if rapid {
            return (
                EscalationKind::Rapid,
                cumulative,
                (0.5 + cumulative).min(1.0),
            );
        }

        let gradual = cumulative >= GRADUAL_CUMULATIVE
            && elapsed > Duration::hours(1)
            && elapsed <= Duration::hours(24)
            && dips_within_tolerance(deltas);
        if gradual {
            return (
                EscalationKind::Gradual,
                cumulative,
                (0.4 + cumulative).min(1.0),
            );
        }

        if max_step >= SUDDEN_STEP {
            return (
                EscalationKind::Sudden,
                cumulative,
                (0.5 + max_step).min(1.0),
            );
        }

        (EscalationKind::None, cumulative, 0.7)
    }

    fn match_patterns(
        &self,
        series: &[(DateTime<Utc>, f64)],
        texts: &[&str],
    ) -> (Option<String>, f64) {
        let mut best: Option<(&CompiledPattern, f64)> = None;
        for pattern in &self.patterns {
            if pattern.matches(series, texts) && best.is_none_or(|(_, w)| pattern.weight > w) {
                best = Some((pattern, pattern.weight));
            }
        }
        match best {
            Some((pattern, weight)) => (Some(pattern.name.clone()), weight.clamp(0.0, 1.0)),
            None => (None, 0.0),
        }
    }
}

fn compile_patterns(configs: &[EscalationPatternConfig]) -> Vec<CompiledPattern> {
    configs
        .iter()
        .filter_map(|c| {
            let regex = match &c.pattern {
                Some(pattern) => Some(Regex::new(pattern).ok()?),
                None => None,
            };
            if regex.is_none() && c.min_rise.is_none() {
                return None;
            }
            Some(CompiledPattern {
                name: c.name.clone(),
                regex,
                min_rise: c.min_rise,
                within_minutes: c.within_minutes,
                weight: c.weight,
            })
        })
        .collect()
}

fn deltas_of(series: &[(DateTime<Utc>, f64)]) -> Vec<f64> {
    series.windows(2).map(|w| w[1].1 - w[0].1).collect()
}

/// Non-decreasing allowing a single small dip.
fn dips_within_tolerance(deltas: &[f64]) -> bool {
    let mut dips = 0;
    for delta in deltas {
        if *delta < 0.0 {
            if -delta >= GRADUAL_DIP {
                return false;
            }
            dips += 1;
            if dips > 1 {
                return false;
            }
        }
    }
    true
}
