//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    #[serde(rename = "initial_backoff_ms", with = "crate::util::duration_ms")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    #[serde(rename = "max_backoff_ms", with = "crate::util::duration_ms")]
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Fresh backoff state for one session.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.clone())
    }

    /// Execute an async operation with retry, abandoning it on cancellation.
    ///
    /// Only retryable errors are retried. Exhausting the budget yields
    /// [`RelayError::RetriesExhausted`] wrapping the last failure. The token is
    /// checked before every attempt and raced against every backoff sleep, so
    /// a cancelled session never leaves a retry scheduled.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        if self.max_attempts == 0 {
            return Err(RelayError::Configuration(
                "retry policy allows zero attempts".into(),
            ));
        }

        let mut backoff = self.backoff();
        loop {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }
            let attempt = backoff.attempt() + 1;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(RelayError::RetriesExhausted {
                    attempts: attempt,
                    last_error: Box::new(err),
                });
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after error"
            );
            crate::util::metrics::record_retry();

            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Backoff state: attempt count and the next delay.
///
/// Delays are 75–125% of the current base, capped at `max_backoff`, and never
/// shrink between consecutive retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    base: Duration,
    last_delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        let base = policy.initial_backoff.min(policy.max_backoff);
        Self {
            policy,
            attempt: 0,
            base,
            last_delay: Duration::ZERO,
        }
    }

    /// Retries taken so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the delay before the next retry and advance the state.
    pub fn next_delay(&mut self) -> Duration {
        let jitter_factor = 0.75 + unit_jitter(self.attempt) * 0.5;
        let max = self.policy.max_backoff.as_secs_f64();
        let jittered = (self.base.as_secs_f64() * jitter_factor).min(max);
        let delay = Duration::from_secs_f64(jittered).max(self.last_delay);

        self.base = Duration::from_secs_f64(
            (self.base.as_secs_f64() * self.policy.multiplier.max(1.0)).min(max),
        );
        self.last_delay = delay;
        self.attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.base = self.policy.initial_backoff.min(self.policy.max_backoff);
        self.last_delay = Duration::ZERO;
    }
}

/// A value in `[0, 1)` drawn from a randomly keyed hasher.
///
/// Each `RandomState` carries fresh keys, so concurrent sessions retrying at
/// the same instant still spread out.
fn unit_jitter(salt: u32) -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(salt);
    (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
}
