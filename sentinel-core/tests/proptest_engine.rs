//! Property-based tests for the scoring, fallback, cache, and validation
//! invariants.

use proptest::prelude::*;

use chrono::{Duration, TimeZone, Utc};
use sentinel_core::config::{
    CacheConfig, EngineConfig, ExternalRiskConfig, FallbackConfig, LabelsConfig,
    SeverityThresholds,
};
use sentinel_core::context::HistoryValidator;
use sentinel_core::fallback::FallbackStrategy;
use sentinel_core::risk_client::RiskClient;
use sentinel_core::scoring::WeightedScorer;
use sentinel_core::types::{
    ConsensusAlgorithm, HistoryItem, ModelResult, ModelRole, Severity, Verbosity,
};
use std::collections::{BTreeMap, BTreeSet};

fn result_for(name: &str, signal: f64) -> ModelResult {
    let (role, scores): (ModelRole, Vec<(String, f64)>) = match name {
        "bart" => (
            ModelRole::Primary,
            vec![
                ("suicidal ideation".into(), signal),
                ("safe".into(), 1.0 - signal),
            ],
        ),
        "sentiment" => (ModelRole::Secondary, vec![("negative".into(), signal)]),
        "irony" => (ModelRole::Tertiary, vec![("ironic".into(), signal)]),
        _ => (ModelRole::Supplementary, vec![("sadness".into(), signal)]),
    };
    let mut map = BTreeMap::new();
    for (label, score) in scores {
        map.insert(label, score);
    }
    ModelResult::success(name, role, map, 1)
}

fn default_weights() -> BTreeMap<String, f64> {
    EngineConfig::default().models.enabled_weights()
}

// --- Scorer outputs stay in range; dampening never raises ---

proptest! {
    #[test]
    fn scorer_outputs_stay_in_unit_interval(
        primary in 0.0_f64..=1.0,
        negative in 0.0_f64..=1.0,
        ironic in 0.0_f64..=1.0,
        sadness in 0.0_f64..=1.0,
        alpha in 0.0_f64..=1.0,
    ) {
        let scorer = WeightedScorer::new(LabelsConfig::default(), alpha);
        let results = vec![
            result_for("bart", primary),
            result_for("sentiment", negative),
            result_for("irony", ironic),
            result_for("emotions", sadness),
        ];
        let breakdown = scorer.score(&results, &default_weights());
        prop_assert!((0.0..=1.0).contains(&breakdown.base_score));
        prop_assert!((0.0..=1.0).contains(&breakdown.confidence));
        prop_assert!((0.0..=1.0).contains(&breakdown.final_score()));
    }

    #[test]
    fn dampening_never_increases_score(
        primary in 0.0_f64..=1.0,
        ironic in 0.0_f64..=1.0,
        alpha in 0.0_f64..=1.0,
    ) {
        let scorer = WeightedScorer::new(LabelsConfig::default(), alpha);
        let results = vec![result_for("bart", primary), result_for("irony", ironic)];
        let breakdown = scorer.score(&results, &default_weights());
        prop_assert!(breakdown.final_score() <= breakdown.base_score + 1e-12);
    }

    #[test]
    fn confidence_respects_floor(
        primary in 0.0_f64..=1.0,
        negative in 0.0_f64..=1.0,
        sadness in 0.0_f64..=1.0,
    ) {
        let scorer = WeightedScorer::new(LabelsConfig::default(), 0.6);
        let results = vec![
            result_for("bart", primary),
            result_for("sentiment", negative),
            result_for("emotions", sadness),
        ];
        let breakdown = scorer.score(&results, &default_weights());
        prop_assert!(breakdown.confidence >= breakdown.max_signal * breakdown.agreement - 1e-12);
    }
}

// --- Severity is monotone in score ---

proptest! {
    #[test]
    fn severity_is_monotone(a in 0.0_f64..=1.0, b in 0.0_f64..=1.0) {
        let thresholds = SeverityThresholds::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.classify(lo) <= thresholds.classify(hi));
    }

    #[test]
    fn severity_boundaries_are_inclusive(score in 0.0_f64..=1.0) {
        let thresholds = SeverityThresholds::default();
        let severity = thresholds.classify(score);
        match severity {
            Severity::Critical => prop_assert!(score >= thresholds.critical),
            Severity::High => prop_assert!(score >= thresholds.high && score < thresholds.critical),
            Severity::Medium => prop_assert!(score >= thresholds.medium && score < thresholds.high),
            Severity::Low => prop_assert!(score >= thresholds.low && score < thresholds.medium),
            Severity::Safe => prop_assert!(score < thresholds.low),
        }
    }
}

// --- Redistributed weights sum to 1 ---

proptest! {
    #[test]
    fn redistributed_weights_sum_to_one(
        keep_sentiment in any::<bool>(),
        keep_irony in any::<bool>(),
        keep_emotions in any::<bool>(),
    ) {
        let fallback = FallbackStrategy::new(FallbackConfig::default());
        let mut survivors: BTreeSet<String> = BTreeSet::new();
        survivors.insert("bart".into());
        if keep_sentiment {
            survivors.insert("sentiment".into());
        }
        if keep_irony {
            survivors.insert("irony".into());
        }
        if keep_emotions {
            survivors.insert("emotions".into());
        }
        let weights = fallback.effective_weights(&default_weights(), &survivors);
        let sum: f64 = weights.values().sum();
        prop_assert!((sum - 1.0).abs() <= 0.01, "sum {sum}");
        // The ceiling holds whenever the primary has company.
        if weights.len() >= 2 {
            prop_assert!(weights["bart"] <= 0.70 + 1e-9);
        }
    }
}

// --- Amplification bounds ---

proptest! {
    #[test]
    fn amplification_never_decreases_or_overflows(
        base in 0.0_f64..=1.0,
        risk in 0.0_f64..=1.0,
        beta in 0.0_f64..=1.0,
    ) {
        let client = RiskClient::new(ExternalRiskConfig {
            beta,
            ..ExternalRiskConfig::default()
        })
        .unwrap();
        let amplified = client.amplify(base, risk);
        prop_assert!(amplified >= base - 1e-12);
        prop_assert!(amplified <= 1.0);
    }
}

// --- History validation yields strictly increasing timestamps ---

proptest! {
    #[test]
    fn validated_history_is_strictly_increasing(
        offsets in prop::collection::vec(0_i64..10_000, 1..40),
    ) {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        // Sorted input (possibly with duplicates) models a well-behaved
        // caller whose clock ticks coarsely.
        let mut sorted = offsets;
        sorted.sort_unstable();
        let history: Vec<HistoryItem> = sorted
            .iter()
            .map(|s| HistoryItem {
                text: "message".into(),
                timestamp: base + Duration::seconds(*s),
                crisis_score: None,
            })
            .collect();

        let validator = HistoryValidator::new(50);
        let validated = validator.validate(&history).unwrap();
        for pair in validated.items.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn validated_history_respects_cap(
        len in 1_usize..120,
        cap in 1_usize..60,
    ) {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let history: Vec<HistoryItem> = (0..len)
            .map(|i| HistoryItem {
                text: format!("m{i}"),
                timestamp: base + Duration::seconds(i as i64),
                crisis_score: None,
            })
            .collect();
        let validator = HistoryValidator::new(cap);
        let validated = validator.validate(&history).unwrap();
        prop_assert!(validated.items.len() <= cap);
        // The newest entries are the ones kept.
        if let Some(last) = validated.items.last() {
            prop_assert_eq!(last.text.clone(), format!("m{}", len - 1));
        }
    }
}

// --- Cache keys are deterministic and text-normalizing ---

proptest! {
    #[test]
    fn cache_key_is_deterministic(message in "[a-zA-Z0-9 ]{1,64}") {
        let a = sentinel_core::cache::cache_key(
            &message,
            ConsensusAlgorithm::Weighted,
            Verbosity::Standard,
            &[],
        );
        let b = sentinel_core::cache::cache_key(
            &message,
            ConsensusAlgorithm::Weighted,
            Verbosity::Standard,
            &[],
        );
        prop_assert_eq!(a, b);
    }

    #[test]
    fn cache_key_ignores_case_and_spacing(message in "[a-z]{1,16}( [a-z]{1,16}){0,4}") {
        let shouted = message.to_uppercase();
        let padded = format!("  {}  ", message.replace(' ', "   "));
        let key = |m: &str| {
            sentinel_core::cache::cache_key(
                m,
                ConsensusAlgorithm::Weighted,
                Verbosity::Standard,
                &[],
            )
        };
        prop_assert_eq!(key(&message), key(&shouted));
        prop_assert_eq!(key(&message), key(&padded));
    }
}

// --- Cache round-trips preserve scores bit-for-bit ---

#[test]
fn cache_round_trip_preserves_bits() {
    use sentinel_core::cache::ResponseCache;
    use sentinel_core::types::{
        AgreementLevel, ConsensusResult, CrisisAssessment, RecommendedAction,
    };

    let cache = ResponseCache::new(&CacheConfig::default());
    let assessment = CrisisAssessment {
        crisis_detected: true,
        severity: Severity::Medium,
        confidence: 0.612_345_678_9,
        crisis_score: 0.598_765_432_1,
        requires_intervention: false,
        requires_review: false,
        recommended_action: RecommendedAction::Monitor,
        signals: vec![],
        consensus: ConsensusResult {
            algorithm: ConsensusAlgorithm::Weighted,
            agreement: AgreementLevel::Strong,
            final_score: 0.598_765_432_1,
            confidence: 0.612_345_678_9,
            votes: vec![],
            requires_review: false,
        },
        conflicts: None,
        resolution: None,
        context: None,
        explanation: "test".into(),
        processing_time_ms: 5,
        models_used: vec![],
        is_degraded: false,
        external_risk: None,
    };
    let key = sentinel_core::cache::cache_key(
        "round trip",
        ConsensusAlgorithm::Weighted,
        Verbosity::Standard,
        &[],
    );
    cache.put(key, assessment.clone());
    let cached = cache.get(key).unwrap();
    assert_eq!(cached.crisis_score.to_bits(), assessment.crisis_score.to_bits());
    assert_eq!(cached.severity, assessment.severity);
}
