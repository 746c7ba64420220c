//! Shared resilience primitives: retry with backoff, deadline wrapping, and
//! parallel inference gathering.
//!
//! Everything concurrent in the engine and the risk client goes through
//! these three utilities, so there is exactly one place where backoff,
//! timeout, and cancellation semantics live.

use crate::types::{ModelResult, ModelRole};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Retry behavior for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay before the given retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let mut ms = (self.initial_backoff_ms as f64 * exp).min(self.max_backoff_ms as f64);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            ms = (ms * factor).min(self.max_backoff_ms as f64);
        }
        Duration::from_millis(ms as u64)
    }
}

/// Run `op` until it succeeds, the error is not transient, or attempts run
/// out. `op` receives the 1-based attempt number.
pub async fn retry_async<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                let delay = policy.backoff(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

/// A deadline elapsed before the wrapped work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {timeout_ms}ms elapsed")]
pub struct DeadlineElapsed {
    pub timeout_ms: u64,
}

/// Run `fut` with a deadline.
pub async fn with_deadline<F>(timeout: Duration, fut: F) -> Result<F::Output, DeadlineElapsed>
where
    F: std::future::Future,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DeadlineElapsed {
            timeout_ms: timeout.as_millis() as u64,
        })
}

// ---------------------------------------------------------------------------
// Parallel inference
// ---------------------------------------------------------------------------

/// One unit of work for [`gather_inferences`].
pub struct InferenceTask {
    pub model_name: String,
    pub role: ModelRole,
    pub future: BoxFuture<'static, ModelResult>,
}

/// Run all inference tasks concurrently and collect every outcome.
///
/// Each task is bounded by `per_model`; the whole gather is bounded by
/// `global`. A task that exceeds its budget, or that is cancelled, yields a
/// failure `ModelResult` rather than an error. When the primary task
/// completes unsuccessfully, outstanding tasks are cancelled cooperatively;
/// their eventual output would be discarded anyway.
pub async fn gather_inferences(
    tasks: Vec<InferenceTask>,
    per_model: Duration,
    global: Duration,
    cancel: CancellationToken,
) -> Vec<ModelResult> {
    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|task| {
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => ModelResult::failure(
                        task.model_name.clone(),
                        task.role,
                        "inference cancelled",
                        0,
                    ),
                    outcome = with_deadline(per_model, task.future) => match outcome {
                        Ok(result) => result,
                        Err(elapsed) => ModelResult::failure(
                            task.model_name.clone(),
                            task.role,
                            format!("inference timed out after {}ms", elapsed.timeout_ms),
                            elapsed.timeout_ms,
                        ),
                    },
                }
            }
        })
        .collect();

    let mut results = Vec::with_capacity(pending.len());
    let collect = async {
        while let Some(result) = pending.next().await {
            if result.role == ModelRole::Primary && !result.success {
                warn!(
                    model = result.model_name.as_str(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Primary inference failed, cancelling stragglers"
                );
                cancel.cancel();
            }
            results.push(result);
        }
    };

    if with_deadline(global, collect).await.is_err() {
        warn!(
            global_ms = global.as_millis() as u64,
            collected = results.len(),
            "Global inference deadline elapsed"
        );
        cancel.cancel();
        // Drain whatever is still pending; cancelled tasks resolve promptly.
        while let Some(result) = pending.next().await {
            results.push(result);
        }
    }

    results
}
