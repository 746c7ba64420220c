//! Request-scoped response cache.
//!
//! Bounded LRU with TTL, keyed on the normalized message text, the
//! consensus algorithm, the verbosity, and a bucketed fingerprint of the
//! supplied history. Timestamps in the fingerprint are floored to the
//! minute so tiny drift between retries does not defeat the cache, while a
//! genuinely different history still misses.

use crate::config::CacheConfig;
use crate::types::{ConsensusAlgorithm, CrisisAssessment, HistoryItem, Verbosity};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache performance counters, exposed on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub enabled: bool,
}

struct Entry {
    assessment: CrisisAssessment,
    inserted_at: Instant,
}

/// TTL-governed LRU over full assessments. Thread-safe; all operations are
/// O(1) under a single short-lived lock.
pub struct ResponseCache {
    inner: Mutex<LruCache<u64, Entry>>,
    ttl: Duration,
    enabled: bool,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_secs(config.ttl_s),
            enabled: config.enabled,
            max_size: config.max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached assessment; expired entries are evicted on read.
    pub fn get(&self, key: u64) -> Option<CrisisAssessment> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Response cache hit");
                Some(entry.assessment.clone())
            }
            Some(_) => {
                inner.pop(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an assessment.
    pub fn put(&self, key: u64, assessment: CrisisAssessment) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.put(
            key,
            Entry {
                assessment,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry (operator command, config reload).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.inner.lock().unwrap().len(),
            max_size: self.max_size,
            enabled: self.enabled,
        }
    }
}

/// Build the cache key for a request.
pub fn cache_key(
    message: &str,
    algorithm: ConsensusAlgorithm,
    verbosity: Verbosity,
    history: &[HistoryItem],
) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(message).as_bytes());
    hasher.update([0u8]);
    hasher.update(algorithm.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(verbosity.to_string().as_bytes());
    for item in history {
        hasher.update([0u8]);
        hasher.update(normalize_text(&item.text).as_bytes());
        // Minute-bucketed timestamp: small drift keeps the same key.
        hasher.update((item.timestamp.timestamp() / 60).to_le_bytes());
    }
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Case-fold and collapse whitespace.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AgreementLevel, ConsensusResult, ModelRole, RecommendedAction, Severity,
    };
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn assessment(score: f64) -> CrisisAssessment {
        CrisisAssessment {
            crisis_detected: false,
            severity: Severity::Safe,
            confidence: 0.5,
            crisis_score: score,
            requires_intervention: false,
            requires_review: false,
            recommended_action: RecommendedAction::Ignore,
            signals: vec![],
            consensus: ConsensusResult {
                algorithm: ConsensusAlgorithm::Weighted,
                agreement: AgreementLevel::Unanimous,
                final_score: score,
                confidence: 0.5,
                votes: vec![],
                requires_review: false,
            },
            conflicts: None,
            resolution: None,
            context: None,
            explanation: "ok".into(),
            processing_time_ms: 1,
            models_used: vec![],
            is_degraded: false,
            external_risk: None,
        }
    }

    fn cache(ttl_s: u64, max_size: usize) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            max_size,
            ttl_s,
        })
    }

    #[test]
    fn test_round_trip() {
        let cache = cache(300, 10);
        let key = cache_key("hello", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        assert!(cache.get(key).is_none());
        cache.put(key, assessment(0.3));
        let hit = cache.get(key).unwrap();
        assert!((hit.crisis_score - 0.3).abs() < f64::EPSILON);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = cache(0, 10);
        let key = cache_key("hello", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        cache.put(key, assessment(0.3));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(key).is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = cache(300, 2);
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let key = cache_key(text, ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
            cache.put(key, assessment(i as f64 / 10.0));
        }
        assert_eq!(cache.stats().size, 2);
        let key_a = cache_key("a", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        assert!(cache.get(key_a).is_none());
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ResponseCache::new(&CacheConfig {
            enabled: false,
            max_size: 10,
            ttl_s: 300,
        });
        let key = cache_key("hello", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        cache.put(key, assessment(0.3));
        assert!(cache.get(key).is_none());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_key_normalizes_text() {
        let a = cache_key("  Hello   World ", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        let b = cache_key("hello world", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_varies_with_algorithm_and_verbosity() {
        let base = cache_key("hello", ConsensusAlgorithm::Weighted, Verbosity::Standard, &[]);
        let alg = cache_key("hello", ConsensusAlgorithm::Unanimous, Verbosity::Standard, &[]);
        let verb = cache_key("hello", ConsensusAlgorithm::Weighted, Verbosity::Detailed, &[]);
        assert_ne!(base, alg);
        assert_ne!(base, verb);
    }

    #[test]
    fn test_history_fingerprint_buckets_timestamps() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 10).unwrap();
        let item = |t| HistoryItem {
            text: "earlier".into(),
            timestamp: t,
            crisis_score: None,
        };
        let a = cache_key(
            "hello",
            ConsensusAlgorithm::Weighted,
            Verbosity::Standard,
            &[item(ts)],
        );
        // Five seconds later, same minute bucket.
        let b = cache_key(
            "hello",
            ConsensusAlgorithm::Weighted,
            Verbosity::Standard,
            &[item(ts + ChronoDuration::seconds(5))],
        );
        // Two minutes later, different bucket.
        let c = cache_key(
            "hello",
            ConsensusAlgorithm::Weighted,
            Verbosity::Standard,
            &[item(ts + ChronoDuration::minutes(2))],
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_history_text_changes_key() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let with = |text: &str| {
            cache_key(
                "hello",
                ConsensusAlgorithm::Weighted,
                Verbosity::Standard,
                &[HistoryItem {
                    text: text.into(),
                    timestamp: ts,
                    crisis_score: None,
                }],
            )
        };
        assert_ne!(with("one"), with("two"));
    }
}
