//! Classification-driven retry evaluation
//!
//! Each outbound collaborator call carries its own retry policy. Whether a
//! failure is retried is decided by the error's own classification, never by
//! inspecting message strings.

use crate::clock::SagaClock;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How a failed call should be treated by the retry evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure; the same call may succeed on a later attempt.
    Retryable,
    /// Deterministic failure; retrying cannot change the outcome.
    NonRetryable,
}

/// Implemented by call error types so the evaluator never guesses.
pub trait Classify {
    /// Classify this error for retry purposes.
    fn class(&self) -> ErrorClass;
}

/// Bounded exponential-backoff retry policy for one collaborator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts (first call included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Optional ceiling on any single delay.
    pub max_interval: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` and 1s/2.0 backoff defaults.
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: None,
        }
    }

    /// With a different delay before the first retry
    #[inline]
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// With a different backoff multiplier
    #[inline]
    #[must_use]
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// With a ceiling on any single delay
    #[inline]
    #[must_use]
    pub fn with_max_interval(mut self, ceiling: Duration) -> Self {
        self.max_interval = Some(ceiling);
        self
    }

    /// Delay before retry `attempt` (zero-based): `initial * coeff^attempt`,
    /// capped at `max_interval` when one is set.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_coefficient.powi(attempt as i32);
        let delay = self.initial_interval.mul_f64(factor);
        match self.max_interval {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }
}

/// Run `call` under `policy`, sleeping through `clock` between attempts.
///
/// Non-retryable errors and exhaustion both surface the last error to the
/// caller unchanged.
pub async fn retry_call<T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn SagaClock,
    mut call: F,
) -> Result<T, E>
where
    E: Classify + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.class() == ErrorClass::NonRetryable {
                    return Err(err);
                }
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "call failed, retrying"
                );
                clock.sleep(delay).await;
            }
        }
    }
}
