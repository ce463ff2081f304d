//! Token bucket rate limiting.
//!
//! A bucket holds up to `capacity` tokens and regains `refill_amount` tokens
//! every `refill_interval`. Partial intervals are carried over, so a caller
//! told to wait by [`TokenBucket::time_until_available`] will find the token
//! there when it comes back.
//!
//! [`SlidingWindow`] is the stricter sibling: it remembers each grant and
//! never lets more than `limit` of them fall inside any `window`-long span,
//! even across the boundary where a fixed-window bucket would refill.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::clock::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u64,
    /// Number of tokens to refill per interval
    pub refill_amount: u64,
    /// Time interval for token refill
    pub refill_interval: Duration,
}

impl TokenBucketConfig {
    /// Bucket that allows `limit` calls per `window`, regaining one token
    /// every `window / limit`.
    pub fn per_window(limit: u64, window: Duration) -> Self {
        let limit = limit.max(1);
        let divisor = u32::try_from(limit).unwrap_or(u32::MAX);
        let interval = (window / divisor).max(Duration::from_millis(1));
        Self { capacity: limit, refill_amount: 1, refill_interval: interval }
    }

    /// Bucket that allows `limit` calls and refills completely once per
    /// `window`.
    pub fn fixed_window(limit: u64, window: Duration) -> Self {
        Self { capacity: limit, refill_amount: limit, refill_interval: window }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::config_field("capacity", "must be greater than 0"));
        }
        if self.refill_amount == 0 {
            return Err(CommonError::config_field("refill_amount", "must be greater than 0"));
        }
        if self.refill_interval.is_zero() {
            return Err(CommonError::config_field(
                "refill_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Allows bursts up to the capacity, then refills tokens at a fixed rate.
/// Clones share the same bucket.
///
/// ```rust
/// use std::time::Duration;
///
/// use partsource_common::resilience::{TokenBucket, TokenBucketConfig};
///
/// let bucket = TokenBucket::new(TokenBucketConfig::fixed_window(2, Duration::from_secs(10)))?;
/// assert!(bucket.try_acquire(1));
/// assert!(bucket.try_acquire(1));
/// assert!(!bucket.try_acquire(1));
/// assert!(bucket.time_until_available(1).is_some());
/// # Ok::<(), partsource_common::CommonError>(())
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("config", &self.config)
            .field("tokens", &self.state.lock().tokens)
            .finish()
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(config: TokenBucketConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        let state = BucketState { tokens: config.capacity, last_refill: clock.now() };
        Ok(Self { config, state: Arc::new(Mutex::new(state)), clock: Arc::new(clock) })
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let interval_nanos = self.config.refill_interval.as_nanos().max(1);
        let refills = elapsed.as_nanos() / interval_nanos;
        if refills == 0 {
            return;
        }

        if state.tokens >= self.config.capacity {
            state.last_refill = now;
            return;
        }

        let refills_u64 = u64::try_from(refills).unwrap_or(u64::MAX);
        let added = refills_u64.saturating_mul(self.config.refill_amount);
        state.tokens = state.tokens.saturating_add(added).min(self.config.capacity);

        if state.tokens >= self.config.capacity {
            state.last_refill = now;
        } else {
            // Carry the partial interval over to the next refill.
            let consumed = self.config.refill_interval.saturating_mul(
                u32::try_from(refills).unwrap_or(u32::MAX),
            );
            state.last_refill += consumed;
        }
        trace!(tokens = state.tokens, "token bucket refilled");
    }

    /// Try to acquire the specified number of tokens
    pub fn try_acquire(&self, tokens: u64) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens < tokens {
            return false;
        }
        state.tokens -= tokens;
        true
    }

    /// Time until `tokens` could be acquired
    ///
    /// Returns `Some(Duration::ZERO)` when they are available now and `None`
    /// when the request exceeds the bucket capacity and can never succeed.
    pub fn time_until_available(&self, tokens: u64) -> Option<Duration> {
        if tokens > self.config.capacity {
            return None;
        }
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens >= tokens {
            return Some(Duration::ZERO);
        }

        let deficit = tokens - state.tokens;
        let intervals = deficit.div_ceil(self.config.refill_amount);
        let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
        let next_full = state.last_refill + self.config.refill_interval.saturating_mul(intervals);
        Some(next_full.saturating_duration_since(now))
    }

    /// Current number of available tokens
    pub fn available_tokens(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    /// Reset the bucket to full capacity
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.config.capacity;
        state.last_refill = self.clock.now();
    }
}

/// Rolling-window limiter that bounds grants within any span of `window`
///
/// Grant instants are kept in order; a slot frees up when the oldest grant
/// is `window` old. Clones share the same log.
pub struct SlidingWindow<C: Clock = SystemClock> {
    limit: usize,
    window: Duration,
    grants: Arc<Mutex<VecDeque<Instant>>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for SlidingWindow<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("in_window", &self.grants.lock().len())
            .finish()
    }
}

impl<C: Clock> Clone for SlidingWindow<C> {
    fn clone(&self) -> Self {
        Self {
            limit: self.limit,
            window: self.window,
            grants: Arc::clone(&self.grants),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> SlidingWindow<C> {
    pub fn with_clock(limit: u64, window: Duration, clock: C) -> CommonResult<Self> {
        if limit == 0 {
            return Err(CommonError::config_field("limit", "must be greater than 0"));
        }
        if window.is_zero() {
            return Err(CommonError::config_field("window", "must be greater than zero"));
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(Self {
            limit,
            window,
            grants: Arc::new(Mutex::new(VecDeque::with_capacity(limit.min(1_024)))),
            clock: Arc::new(clock),
        })
    }

    fn expire(&self, grants: &mut VecDeque<Instant>, now: Instant) {
        while grants
            .front()
            .is_some_and(|granted| now.saturating_duration_since(*granted) >= self.window)
        {
            grants.pop_front();
        }
    }

    /// Record a grant if fewer than `limit` fall inside the current window
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut grants = self.grants.lock();
        self.expire(&mut grants, now);
        if grants.len() >= self.limit {
            return false;
        }
        grants.push_back(now);
        true
    }

    /// Time until the oldest grant in the window ages out, zero when a slot
    /// is free now
    pub fn time_until_available(&self) -> Duration {
        let now = self.clock.now();
        let mut grants = self.grants.lock();
        self.expire(&mut grants, now);
        if grants.len() < self.limit {
            return Duration::ZERO;
        }
        grants
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Grants still counted against the window
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        let mut grants = self.grants.lock();
        self.expire(&mut grants, now);
        grants.len()
    }
}
