//! Fallback strategy: per-model failure tracking, circuit breakers, and
//! weight redistribution.
//!
//! Failure counters decay exponentially (configurable half-life) so an old
//! burst of errors does not keep a healthy model gated. A model whose
//! decayed counter crosses the threshold trips its breaker for a cooldown;
//! gating reads are cheap snapshots. When non-primary models drop out of a
//! request, their weight is redistributed pro-rata over the survivors with
//! a ceiling on the primary's share.

use crate::config::FallbackConfig;
use crate::models::BART;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct ModelHealth {
    failures: f64,
    last_update: Instant,
    open_until: Option<Instant>,
}

impl ModelHealth {
    fn new() -> Self {
        Self {
            failures: 0.0,
            last_update: Instant::now(),
            open_until: None,
        }
    }

    fn decay(&mut self, half_life_secs: u64, now: Instant) {
        if half_life_secs == 0 {
            return;
        }
        let dt = now.duration_since(self.last_update).as_secs_f64();
        if dt > 0.0 {
            self.failures *= 0.5_f64.powf(dt / half_life_secs as f64);
            self.last_update = now;
        }
    }

    fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }
}

/// Snapshot of one model's breaker, for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ModelBreakerStatus {
    pub model: String,
    pub failures: f64,
    pub open: bool,
}

/// Tracks model health and computes effective per-request weights.
pub struct FallbackStrategy {
    config: FallbackConfig,
    state: Mutex<BTreeMap<String, ModelHealth>>,
}

impl FallbackStrategy {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record an inference failure; may trip the model's breaker.
    pub fn record_failure(&self, model: &str) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let health = state
            .entry(model.to_string())
            .or_insert_with(ModelHealth::new);
        health.decay(self.config.half_life_secs, now);
        health.failures += 1.0;
        if health.failures >= self.config.failure_threshold && !health.is_open(now) {
            health.open_until =
                Some(now + std::time::Duration::from_secs(self.config.cooldown_secs));
            warn!(
                model,
                failures = health.failures,
                cooldown_secs = self.config.cooldown_secs,
                "Model circuit breaker tripped"
            );
        }
    }

    /// Record a successful inference: clears the counter and closes the
    /// breaker.
    pub fn record_success(&self, model: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(health) = state.get_mut(model) {
            if health.failures > 0.0 || health.open_until.is_some() {
                debug!(model, "Model breaker reset after success");
            }
            health.failures = 0.0;
            health.open_until = None;
            health.last_update = Instant::now();
        }
    }

    /// Whether the model's breaker currently short-circuits calls.
    pub fn is_open(&self, model: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .unwrap()
            .get(model)
            .is_some_and(|h| h.is_open(now))
    }

    /// Whether the primary model is callable.
    pub fn primary_available(&self) -> bool {
        !self.is_open(BART)
    }

    /// Clear all counters and close every breaker (operator command or
    /// post-reload).
    pub fn reset(&self) {
        self.state.lock().unwrap().clear();
        debug!("Fallback state reset");
    }

    /// Snapshot of every tracked model.
    pub fn snapshot(&self) -> Vec<ModelBreakerStatus> {
        let now = Instant::now();
        self.state
            .lock()
            .unwrap()
            .iter()
            .map(|(model, health)| ModelBreakerStatus {
                model: model.clone(),
                failures: health.failures,
                open: health.is_open(now),
            })
            .collect()
    }

    /// Redistribute static weights over the models that survived this
    /// request, keeping the sum at 1.0.
    ///
    /// The primary's grown share is capped at the configured ceiling when at
    /// least one other model survives; the excess spills to the
    /// next-highest-weight survivor. A sole surviving primary keeps the full
    /// weight: there is nowhere to spill, and the weight-sum invariant wins.
    pub fn effective_weights(
        &self,
        static_weights: &BTreeMap<String, f64>,
        survivors: &BTreeSet<String>,
    ) -> BTreeMap<String, f64> {
        let surviving: Vec<(&String, f64)> = static_weights
            .iter()
            .filter(|(name, _)| survivors.contains(*name))
            .map(|(name, w)| (name, *w))
            .collect();
        let total: f64 = surviving.iter().map(|(_, w)| w).sum();
        if surviving.is_empty() || total <= 0.0 {
            return BTreeMap::new();
        }

        let mut weights: BTreeMap<String, f64> = surviving
            .iter()
            .map(|(name, w)| ((*name).clone(), w / total))
            .collect();

        if weights.len() >= 2 {
            if let Some(&primary_weight) = weights.get(BART) {
                if primary_weight > self.config.primary_ceiling {
                    let excess = primary_weight - self.config.primary_ceiling;
                    weights.insert(BART.to_string(), self.config.primary_ceiling);
                    let spill_target = weights
                        .iter()
                        .filter(|(name, _)| name.as_str() != BART)
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(name, _)| name.clone());
                    if let Some(target) = spill_target {
                        *weights.get_mut(&target).unwrap() += excess;
                    }
                }
            }
        }

        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(config: FallbackConfig) -> FallbackStrategy {
        FallbackStrategy::new(config)
    }

    fn default_weights() -> BTreeMap<String, f64> {
        [
            ("bart", 0.50),
            ("sentiment", 0.25),
            ("irony", 0.15),
            ("emotions", 0.10),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn survivors(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_breaker_trips_at_threshold() {
        let s = strategy(FallbackConfig::default());
        s.record_failure("irony");
        s.record_failure("irony");
        assert!(!s.is_open("irony"));
        s.record_failure("irony");
        assert!(s.is_open("irony"));
    }

    #[test]
    fn test_success_resets_counter_and_breaker() {
        let s = strategy(FallbackConfig::default());
        for _ in 0..3 {
            s.record_failure("sentiment");
        }
        assert!(s.is_open("sentiment"));
        s.record_success("sentiment");
        assert!(!s.is_open("sentiment"));
        let snap = s.snapshot();
        let sentiment = snap.iter().find(|m| m.model == "sentiment").unwrap();
        assert_eq!(sentiment.failures, 0.0);
    }

    #[test]
    fn test_counter_decays_over_time() {
        let s = strategy(FallbackConfig {
            half_life_secs: 1,
            failure_threshold: 3.0,
            ..FallbackConfig::default()
        });
        s.record_failure("emotions");
        s.record_failure("emotions");
        std::thread::sleep(std::time::Duration::from_millis(1100));
        // Two failures decayed to ~1; one more should not trip.
        s.record_failure("emotions");
        assert!(!s.is_open("emotions"));
    }

    #[test]
    fn test_cooldown_expires() {
        let s = strategy(FallbackConfig {
            cooldown_secs: 0,
            ..FallbackConfig::default()
        });
        for _ in 0..3 {
            s.record_failure("irony");
        }
        // Zero-second cooldown expires immediately.
        assert!(!s.is_open("irony"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let s = strategy(FallbackConfig::default());
        for _ in 0..4 {
            s.record_failure("irony");
        }
        s.reset();
        assert!(!s.is_open("irony"));
        assert!(s.snapshot().is_empty());
    }

    #[test]
    fn test_primary_available_tracks_bart() {
        let s = strategy(FallbackConfig::default());
        assert!(s.primary_available());
        for _ in 0..3 {
            s.record_failure("bart");
        }
        assert!(!s.primary_available());
    }

    #[test]
    fn test_weights_unchanged_when_all_survive() {
        let s = strategy(FallbackConfig::default());
        let weights = s.effective_weights(
            &default_weights(),
            &survivors(&["bart", "sentiment", "irony", "emotions"]),
        );
        assert!((weights["bart"] - 0.50).abs() < 1e-9);
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_redistribution_is_pro_rata() {
        let s = strategy(FallbackConfig::default());
        let weights =
            s.effective_weights(&default_weights(), &survivors(&["bart", "sentiment", "irony"]));
        // 0.90 surviving mass: 0.50/0.90, 0.25/0.90, 0.15/0.90.
        assert!((weights["bart"] - 0.50 / 0.90).abs() < 1e-9);
        assert!((weights["sentiment"] - 0.25 / 0.90).abs() < 1e-9);
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_primary_ceiling_spills_to_next_highest() {
        let s = strategy(FallbackConfig::default());
        let weights =
            s.effective_weights(&default_weights(), &survivors(&["bart", "emotions"]));
        // Raw renormalization would give bart 0.50/0.60 ≈ 0.833.
        assert!((weights["bart"] - 0.70).abs() < 1e-9);
        assert!((weights["emotions"] - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_sole_primary_keeps_full_weight() {
        let s = strategy(FallbackConfig::default());
        let weights = s.effective_weights(&default_weights(), &survivors(&["bart"]));
        assert_eq!(weights.len(), 1);
        assert!((weights["bart"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_survivors_yields_empty() {
        let s = strategy(FallbackConfig::default());
        assert!(
            s.effective_weights(&default_weights(), &survivors(&[]))
                .is_empty()
        );
    }

    #[test]
    fn test_weights_always_sum_to_one() {
        let s = strategy(FallbackConfig::default());
        let combos: [&[&str]; 5] = [
            &["bart", "sentiment", "irony", "emotions"],
            &["bart", "sentiment", "irony"],
            &["bart", "sentiment"],
            &["bart", "irony"],
            &["bart", "emotions"],
        ];
        for combo in combos {
            let weights = s.effective_weights(&default_weights(), &survivors(combo));
            let sum: f64 = weights.values().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum {sum} for {combo:?}");
        }
    }
}
