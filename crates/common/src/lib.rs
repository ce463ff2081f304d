//! Modular common utilities shared across PartSource crates.
//!
//! Nothing in here knows about vendors, quotes or purchase orders. The
//! resilience primitives are generic over a [`resilience::Clock`] so that the
//! sourcing engine can drive them with real, tokio or mock time.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error types and classification
//! - `runtime`: resilience (clock, circuit breaker, token bucket, retry)
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, Jitter, MockClock,
    RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryOutcome, RetryPolicy,
    SlidingWindow, SystemClock, TokenBucket, TokioClock,
};
