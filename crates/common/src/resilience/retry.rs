//! Retry executor with pluggable backoff, jitter and retry policies.
//!
//! The executor runs on tokio's timer, so retry delays respect
//! `tokio::time::pause` in tests and are cancelled together with the task
//! that awaits them.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors produced by [`RetryExecutor`]
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; `source` is the last error
    #[error("all {attempts} attempts failed: {source:?}")]
    Exhausted { attempts: u32, source: E },

    /// The policy decided the error is not worth retrying
    #[error("non-retryable failure after {attempts} attempt(s): {source:?}")]
    NonRetryable { attempts: u32, source: E },

    /// The total time budget ran out before another attempt could start
    #[error("retry budget exceeded after {elapsed:?} ({attempts} attempts)")]
    TimeoutExceeded { attempts: u32, elapsed: Duration, source: Option<E> },
}

impl<E> RetryError<E> {
    /// The last operation error, if one was observed
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => Some(source),
            Self::TimeoutExceeded { source, .. } => source.as_ref(),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => Some(source),
            Self::TimeoutExceeded { source, .. } => source,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::TimeoutExceeded { attempts, .. } => *attempts,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including summary statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Number of attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Decides whether an error should be retried
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E, u32) -> RetryDecision,
{
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
        self(error, attempt)
    }
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry after a caller-chosen delay (e.g. a `Retry-After` hint)
    RetryAfter(Duration),
    /// Give up
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// `initial_delay + retry * increment`
    Linear { initial_delay: Duration, increment: Duration },
    /// `initial_delay * multiplier^retry`, capped at `max_delay`
    Exponential { initial_delay: Duration, multiplier: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(retry))
            }
            Self::Exponential { initial_delay, multiplier, max_delay } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let factor = multiplier.powi(exponent);
                let scaled = initial_delay.as_secs_f64() * factor;
                if !scaled.is_finite() || scaled >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(scaled.max(0.0))
                }
            }
        }
    }
}

/// Jitter applied on top of the backoff delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

impl Jitter {
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return delay;
        }
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
    /// Upper bound on time spent across all attempts and delays
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
            max_total_time: None,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, multiplier, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn max_total_time(mut self, duration: Duration) -> Self {
        self.config.max_total_time = Some(duration);
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

/// The retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics
    ///
    /// The operation receives the 1-based attempt number.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "executing operation");

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, total_delay };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt - 1) {
                RetryDecision::Stop => {
                    debug!(attempt, ?error, "retry policy stopped retrying");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { attempts: attempt, source: error }),
                        attempts: attempt,
                        total_delay,
                    };
                }
                _ if attempt >= max_attempts => {
                    warn!(attempts = attempt, ?error, "all retry attempts exhausted");
                    return RetryOutcome {
                        result: Err(RetryError::Exhausted { attempts: attempt, source: error }),
                        attempts: attempt,
                        total_delay,
                    };
                }
                RetryDecision::Retry => {
                    self.config.jitter.apply(self.config.backoff.delay_for(attempt - 1))
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            if let Some(budget) = self.config.max_total_time {
                let elapsed = started.elapsed();
                if elapsed.saturating_add(delay) >= budget {
                    warn!(?elapsed, attempts = attempt, "retry budget exceeded");
                    return RetryOutcome {
                        result: Err(RetryError::TimeoutExceeded {
                            attempts: attempt,
                            elapsed,
                            source: Some(error),
                        }),
                        attempts: attempt,
                        total_delay,
                    };
                }
            }

            warn!(attempt, ?delay, ?error, "operation failed, retrying");
            tokio::time::sleep(delay).await;
            total_delay += delay;
        }
    }
}

/// Pre-defined retry policies
pub mod policies {
    use super::{RetryDecision, RetryPolicy};
    use crate::error::ErrorClassification;

    /// Retries on any error
    #[derive(Debug, Clone, Copy)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retries
    #[derive(Debug, Clone, Copy)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries errors that classify themselves as retryable, honouring their
    /// `retry_after` hint
    #[derive(Debug, Clone, Copy)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            match (error.is_retryable(), error.retry_after()) {
                (false, _) => RetryDecision::Stop,
                (true, Some(delay)) => RetryDecision::RetryAfter(delay),
                (true, None) => RetryDecision::Retry,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::policies::{AlwaysRetry, ClassifiedRetry, NeverRetry};
    use super::*;
    use crate::error::CommonError;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .fixed_backoff(Duration::from_millis(10))
            .jitter(Jitter::None)
            .build()
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(60), Duration::from_millis(500));
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        for _ in 0..100 {
            let delay = Jitter::Equal.apply(Duration::from_millis(200));
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_config(3), AlwaysRetry);

        let counter = Arc::clone(&calls);
        let outcome = executor
            .execute_with_outcome(|_attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
        assert_eq!(outcome.total_delay, Duration::from_millis(20));
        assert_eq!(outcome.result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_keeps_last_error() {
        let executor = RetryExecutor::new(fast_config(2), AlwaysRetry);
        let result: RetryResult<(), String> =
            executor.execute(|attempt| async move { Err(format!("failure {attempt}")) }).await;

        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert_eq!(source, "failure 2");
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_decision_short_circuits() {
        let executor = RetryExecutor::new(fast_config(5), NeverRetry);
        let result: RetryResult<(), &str> = executor.execute(|_| async { Err("bad") }).await;
        assert!(matches!(result, Err(RetryError::NonRetryable { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn classified_policy_honours_retry_after() {
        let executor = RetryExecutor::new(fast_config(2), ClassifiedRetry);
        let outcome = executor
            .execute_with_outcome(|attempt| async move {
                if attempt == 1 {
                    Err(CommonError::rate_limit(Some(Duration::from_secs(3))))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.total_delay, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn total_time_budget_is_enforced() {
        let config = RetryConfig::builder()
            .max_attempts(10)
            .fixed_backoff(Duration::from_secs(5))
            .jitter(Jitter::None)
            .max_total_time(Duration::from_secs(12))
            .build();
        let executor = RetryExecutor::new(config, AlwaysRetry);

        let result: RetryResult<(), &str> = executor.execute(|_| async { Err("down") }).await;
        match result {
            Err(RetryError::TimeoutExceeded { attempts, source, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, Some("down"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
