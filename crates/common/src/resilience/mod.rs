//! Resilience patterns for calling slow, unreliable collaborators.
//!
//! - **Clock**: time abstraction so limits and breakers can be tested
//!   deterministically (`MockClock`) or in tokio's paused time (`TokioClock`)
//! - **Circuit Breaker**: stops calling a dependency after a failure streak
//! - **Token Bucket**: bounds request rates while allowing short bursts
//! - **Sliding Window**: hard cap on grants inside any rolling window
//! - **Retry**: configurable retry executor with backoff and jitter
//!
//! Everything here is generic. Vendor-specific policy (which failures count
//! toward a streak, how rate-limit windows map onto buckets) lives in
//! `partsource-core`.

pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock, TokioClock};
pub use rate_limiter::{SlidingWindow, TokenBucket, TokenBucketConfig};
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
