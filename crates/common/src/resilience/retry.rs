//! Bounded retry with configurable backoff and jitter.
//!
//! The executor retries an async operation until it succeeds, the policy
//! stops it, or the attempt budget runs out. Policies decide retryability
//! per error; the default [`ClassificationPolicy`] defers to the error's
//! [`ErrorClassification`] implementation.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorClassification;

/// Errors produced by the retry executor.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts were exhausted; carries the last operation error.
    #[error("all retry attempts exhausted after {attempts} tries: {source}")]
    AttemptsExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The error returned by the final attempt.
        source: E,
    },

    /// The operation failed with an error the policy refuses to retry.
    #[error("operation failed with non-retryable error: {source}")]
    NonRetryable {
        /// The non-retryable error.
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Consume the wrapper and return the underlying operation error.
    pub fn into_source(self) -> E {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => source,
        }
    }
}

/// Result type for retry operations.
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Decision returned by a [`RetryPolicy`] for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry with the configured backoff delay.
    Retry,
    /// Retry after a custom delay supplied by the error source.
    RetryAfter(Duration),
    /// Do not retry.
    Stop,
}

/// Trait for deciding whether a failed attempt should be retried.
pub trait RetryPolicy<E> {
    /// Inspect the error and the zero-based attempt index.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Policy that defers to the error's own [`ErrorClassification`].
///
/// Retryable errors retry (honoring `retry_after` hints); everything else
/// stops immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationPolicy;

impl<E: ErrorClassification> RetryPolicy<E> for ClassificationPolicy {
    fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Stop;
        }
        match error.retry_after() {
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::Retry,
        }
    }
}

/// Backoff strategy for calculating delays between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped.
    Exponential {
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Multiplier applied per attempt.
        base: f64,
        /// Upper bound on any single delay.
        max_delay: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate the delay for the given zero-based attempt index.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(attempt as i32);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }
}

/// Jitter applied to calculated delays to avoid thundering herds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter.
    None,
    /// Uniform over `0..=delay`.
    Full,
    /// Uniform over `delay/2..=delay`.
    Equal,
}

impl Jitter {
    /// Apply jitter to a calculated delay.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(Self::random_value(delay.as_millis() as u64)),
            Self::Equal => {
                let half = delay.as_millis() as u64 / 2;
                Duration::from_millis(half + Self::random_value(half))
            }
        }
    }

    /// Pseudo-random value derived from a timing seed; good enough
    /// distribution for jitter without pulling in an RNG dependency.
    fn random_value(max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        let nanos = Instant::now().elapsed().subsec_nanos() as u64;
        let mut seed = nanos.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        seed % max
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Backoff strategy for delays between attempts.
    pub backoff: BackoffStrategy,
    /// Jitter applied to each delay.
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(500),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the jitter mode.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Execute an async operation with bounded retries.
///
/// The policy is consulted after every failure. `RetryDecision::Stop`
/// short-circuits with [`RetryError::NonRetryable`]; exhausting
/// `max_attempts` yields [`RetryError::AttemptsExhausted`] carrying the
/// final error.
pub async fn retry_with_policy<T, E, P, F, Fut>(
    config: &RetryConfig,
    policy: &P,
    mut operation: F,
) -> RetryResult<T, E>
where
    E: std::fmt::Display,
    P: RetryPolicy<E>,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                let decision = policy.should_retry(&error, attempt);

                if decision == RetryDecision::Stop {
                    debug!(%error, "policy stopped retry");
                    return Err(RetryError::NonRetryable { source: error });
                }

                attempt += 1;
                if attempt >= max_attempts {
                    warn!(attempts = attempt, %error, "retry attempts exhausted");
                    return Err(RetryError::AttemptsExhausted { attempts: attempt, source: error });
                }

                let delay = match decision {
                    RetryDecision::RetryAfter(custom) => custom,
                    _ => config.jitter.apply(config.backoff.calculate_delay(attempt - 1)),
                };
                debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after delay");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
