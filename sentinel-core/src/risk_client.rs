//! Client for the remote specialized risk-detection service.
//!
//! The remote model exists to catch subtle crises the primary missed, so
//! the client only fires when the decision gate says amplification could
//! change the outcome. Every failure path degrades gracefully: the engine
//! always proceeds on the base score, and the worst the remote service can
//! do is be unavailable.
//!
//! Amplification is at-most-additive and capped:
//! `amplified = min(1.0, base + β × risk × (1 − base))`, so it can never
//! lower a score or push it past 1.0.

use crate::config::{BreakerConfig, ExternalRiskConfig};
use crate::error::RiskClientError;
use crate::retry::{RetryPolicy, retry_async, with_deadline};
use crate::types::{ExternalRiskOutcome, RiskServiceStatus, Severity};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// State of the risk-service circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — calls are permitted.
    Closed,
    /// Too many failures — calls are blocked.
    Open,
    /// Recovery window — a bounded number of probes are permitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
enum BreakerInner {
    Closed { failures: usize },
    Open { since: Instant },
    HalfOpen { probes_left: usize },
}

/// Three-state breaker with bounded half-open probes.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: BreakerInner,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: BreakerInner::Closed { failures: 0 },
            config,
        }
    }

    /// Whether a call is currently permitted. Consumes a probe when
    /// half-open.
    pub fn is_call_permitted(&mut self) -> bool {
        match &mut self.inner {
            BreakerInner::Closed { .. } => true,
            BreakerInner::Open { since } => {
                if since.elapsed() >= Duration::from_secs(self.config.open_secs) {
                    debug!("Risk-service breaker transitioning to half-open");
                    self.inner = BreakerInner::HalfOpen {
                        probes_left: self.config.half_open_probes.max(1) - 1,
                    };
                    true
                } else {
                    false
                }
            }
            BreakerInner::HalfOpen { probes_left } => {
                if *probes_left > 0 {
                    *probes_left -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if !matches!(self.inner, BreakerInner::Closed { failures: 0 }) {
            debug!("Risk-service breaker closed");
        }
        self.inner = BreakerInner::Closed { failures: 0 };
    }

    pub fn record_failure(&mut self) {
        match &mut self.inner {
            BreakerInner::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    warn!(failures = *failures, "Risk-service breaker opened");
                    self.inner = BreakerInner::Open {
                        since: Instant::now(),
                    };
                }
            }
            BreakerInner::HalfOpen { .. } => {
                warn!("Risk-service probe failed, breaker re-opened");
                self.inner = BreakerInner::Open {
                    since: Instant::now(),
                };
            }
            BreakerInner::Open { .. } => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner {
            BreakerInner::Closed { .. } => CircuitState::Closed,
            BreakerInner::Open { .. } => CircuitState::Open,
            BreakerInner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AssessRequest<'a> {
    message: &'a str,
}

/// Verdict returned by the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskVerdict {
    pub risk_score: f64,
    pub risk_label: String,
}

/// HTTP client with gate, breaker, retry, and capped amplification.
pub struct RiskClient {
    config: ExternalRiskConfig,
    http: reqwest::Client,
    breaker: Mutex<CircuitBreaker>,
    retry: RetryPolicy,
}

impl RiskClient {
    pub fn new(config: ExternalRiskConfig) -> Result<Self, RiskClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_s.max(0.1)))
            .build()
            .map_err(|e| RiskClientError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let breaker = Mutex::new(CircuitBreaker::new(config.breaker.clone()));
        Ok(Self {
            config,
            http,
            breaker,
            // A single retry on transient errors; 4xx responses are final.
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 50,
                max_backoff_ms: 200,
                backoff_multiplier: 2.0,
                jitter: true,
            },
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current breaker state, for the status surface.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.lock().unwrap().state()
    }

    /// Decision gate: amplify only when it could change the outcome and
    /// traffic limits allow it.
    pub fn should_amplify(&self, base_score: f64, severity: Severity) -> bool {
        self.config.enabled
            && base_score < self.config.skip_threshold
            && (severity >= Severity::Medium || self.config.amplify_low)
    }

    /// Capped, at-most-additive amplification: never lowers the score, never
    /// exceeds 1.0.
    pub fn amplify(&self, base_score: f64, risk_score: f64) -> f64 {
        let risk = risk_score.clamp(0.0, 1.0);
        let base = base_score.clamp(0.0, 1.0);
        (base + self.config.beta * risk * (1.0 - base)).min(1.0)
    }

    /// Run the full gate → call → amplify path for one message.
    ///
    /// Never returns an error: every failure mode maps onto an
    /// [`ExternalRiskOutcome`] the engine can carry in the assessment.
    pub async fn assess(
        &self,
        message: &str,
        base_score: f64,
        severity: Severity,
    ) -> ExternalRiskOutcome {
        if !self.config.enabled {
            return ExternalRiskOutcome {
                status: RiskServiceStatus::Disabled,
                risk_score: None,
                risk_label: None,
                pre_amplification: None,
                amplified: None,
            };
        }
        if !self.should_amplify(base_score, severity) {
            return ExternalRiskOutcome {
                status: RiskServiceStatus::Skipped,
                risk_score: None,
                risk_label: None,
                pre_amplification: Some(base_score),
                amplified: None,
            };
        }
        if !self.breaker.lock().unwrap().is_call_permitted() {
            debug!("Risk-service breaker open, proceeding on base score");
            return ExternalRiskOutcome {
                status: RiskServiceStatus::Unavailable,
                risk_score: None,
                risk_label: None,
                pre_amplification: Some(base_score),
                amplified: None,
            };
        }

        match self.call_remote(message).await {
            Ok(verdict) => {
                self.breaker.lock().unwrap().record_success();
                let amplified = self.amplify(base_score, verdict.risk_score);
                debug!(
                    risk_score = verdict.risk_score,
                    risk_label = verdict.risk_label.as_str(),
                    base_score,
                    amplified,
                    "External risk applied"
                );
                ExternalRiskOutcome {
                    status: RiskServiceStatus::Applied,
                    risk_score: Some(verdict.risk_score.clamp(0.0, 1.0)),
                    risk_label: Some(verdict.risk_label),
                    pre_amplification: Some(base_score),
                    amplified: Some(amplified),
                }
            }
            Err(e) => {
                warn!(error = %e, "External risk service unavailable");
                self.breaker.lock().unwrap().record_failure();
                ExternalRiskOutcome {
                    status: RiskServiceStatus::Unavailable,
                    risk_score: None,
                    risk_label: None,
                    pre_amplification: Some(base_score),
                    amplified: None,
                }
            }
        }
    }

    async fn call_remote(&self, message: &str) -> Result<RiskVerdict, RiskClientError> {
        let timeout = Duration::from_secs_f64(self.config.timeout_s.max(0.1));
        retry_async(&self.retry, RiskClientError::is_transient, |attempt| {
            let url = format!("{}/assess", self.config.base_url.trim_end_matches('/'));
            async move {
                if attempt > 1 {
                    debug!(attempt, "Retrying risk-service call");
                }
                let response = with_deadline(
                    timeout,
                    self.http.post(&url).json(&AssessRequest { message }).send(),
                )
                .await
                .map_err(|e| RiskClientError::Timeout {
                    timeout_ms: e.timeout_ms,
                })?
                .map_err(|e| RiskClientError::Request {
                    message: e.to_string(),
                })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(RiskClientError::Status {
                        status: status.as_u16(),
                    });
                }

                let verdict: RiskVerdict =
                    response.json().await.map_err(|e| RiskClientError::Parse {
                        message: e.to_string(),
                    })?;
                Ok(verdict)
            }
        })
        .await
    }
}
