//! Engine constants
//!
//! Centralized location for the domain-level defaults and limits used by the
//! sourcing and procurement stages.

// Sourcing defaults
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 500.0;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_QUOTING_DEADLINE_SECS: u64 = 30;

// Vendor call defaults
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 250;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 5_000;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 8;
pub const DEFAULT_QUOTE_CACHE_TTL_SECS: u64 = 300;

// Purchase orders
pub const DEFAULT_PO_AUTO_APPROVE_LIMIT: f64 = 1_000.0;
pub const DEFAULT_MAX_SEQUENCE_ATTEMPTS: u32 = 25;
pub const PO_SEQUENCE_MIN_WIDTH: usize = 3;
pub const SYSTEM_ACTOR: &str = "system";

// Event names
pub const EVENT_SOURCING_STATUS_CHANGED: &str = "sourcing.status_changed";
pub const EVENT_PO_GENERATED: &str = "po.generated";
pub const EVENT_PO_RECEIVED: &str = "po.received";

// Health checks
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;

/// Round a monetary amount to cents
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
