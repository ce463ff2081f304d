//! Failure-streak circuit breaker.
//!
//! The breaker counts *consecutive* failures. Once the streak reaches
//! `failure_threshold` the circuit opens and callers are expected to skip the
//! protected dependency. Two recovery modes are supported:
//!
//! - `open_timeout = Some(d)`: after `d` the breaker lets a limited number of
//!   trial calls through (half-open) and closes after `success_threshold`
//!   successes.
//! - `open_timeout = None`: the breaker stays open until something outside
//!   the request path (a health check, a manual check) calls
//!   [`CircuitBreaker::force_close`].
//!
//! All state lives behind one mutex so a transition is never observed half
//! applied by concurrent callers.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected
    Open,
    /// A limited number of trial calls are allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Successes needed to close the circuit from half-open
    pub success_threshold: u32,
    /// Time before an open circuit admits trial calls; `None` keeps it open
    /// until [`CircuitBreaker::force_close`]
    pub open_timeout: Option<Duration>,
    /// Maximum number of calls allowed in half-open state
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout: Some(Duration::from_secs(60)),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(CommonError::config_field(
                "success_threshold",
                "must be greater than 0",
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(CommonError::config_field(
                "half_open_max_calls",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = Some(timeout);
        self
    }

    /// Keep the circuit open until it is closed explicitly
    pub fn manual_recovery(mut self) -> Self {
        self.config.open_timeout = None;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> CommonResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_calls: u32,
    total_failures: u64,
    total_successes: u64,
    opened_at: Option<Instant>,
}

impl BreakerInner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_calls: 0,
            total_failures: 0,
            total_successes: 0,
            opened_at: None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.half_open_calls = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.half_open_calls = 0;
        self.half_open_successes = 0;
    }
}

/// Circuit breaker with a pluggable clock
///
/// Clones share state, so one breaker can be handed to several workers.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner::closed())),
            clock: Arc::new(clock),
        })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check whether a call may proceed, moving an expired open circuit to
    /// half-open and reserving a trial slot when it does.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let (Some(timeout), Some(opened_at)) = (self.config.open_timeout, inner.opened_at)
                else {
                    return false;
                };
                if self.clock.now().duration_since(opened_at) < timeout {
                    return false;
                }
                debug!("circuit breaker open timeout elapsed; admitting trial call");
                inner.state = CircuitState::HalfOpen;
                inner.half_open_calls = 1;
                inner.half_open_successes = 0;
                true
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whether callers should currently skip the dependency
    ///
    /// Unlike [`can_execute`](Self::can_execute) this never changes state.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.state, self.config.open_timeout, inner.opened_at) {
            (CircuitState::Open, Some(timeout), Some(opened_at)) => {
                self.clock.now().duration_since(opened_at) < timeout
            }
            (CircuitState::Open, _, _) => true,
            _ => false,
        }
    }

    /// Record a successful call and return the resulting state
    pub fn record_success(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        let state = inner.state;
        match state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.close();
                    info!("circuit breaker closed after successful trial calls");
                }
            }
            CircuitState::Open => {
                // A call that started before the circuit opened; the streak
                // stays until the breaker is closed explicitly.
                debug!("success recorded while circuit is open");
            }
        }
        inner.state
    }

    /// Record a failed call and return the resulting state
    pub fn record_failure(&self) -> CircuitState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let streak = inner.consecutive_failures;
        let state = inner.state;

        match state {
            CircuitState::Closed if streak >= self.config.failure_threshold => {
                inner.open(now);
                warn!(consecutive_failures = streak, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                inner.open(now);
                warn!("circuit breaker re-opened by failed trial call");
            }
            _ => {}
        }
        inner.state
    }

    /// Seed the failure streak from persisted state, opening the circuit when
    /// the streak already meets the threshold.
    pub fn restore(&self, consecutive_failures: u32) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.consecutive_failures = consecutive_failures;
        if consecutive_failures >= self.config.failure_threshold {
            inner.open(now);
        }
    }

    /// Open the circuit regardless of the failure streak
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.max(self.config.failure_threshold);
        inner.open(now);
    }

    /// Close the circuit and clear the failure streak
    pub fn force_close(&self) {
        self.inner.lock().close();
        info!("circuit breaker closed explicitly");
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            opened_at: inner.opened_at,
        }
    }
}
