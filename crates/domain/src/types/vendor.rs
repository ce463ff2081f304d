//! Vendor integration configuration and runtime counters

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_INITIAL_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_RETRIES,
    DEFAULT_QUOTE_CACHE_TTL_SECS,
};
use crate::{impl_domain_status_conversions, PartSourceError, Result};

/// Transport a vendor integration speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Rest,
    Edi,
    Email,
    Portal,
    FileExport,
}

impl_domain_status_conversions!(ApiType {
    Rest => "rest",
    Edi => "edi",
    Email => "email",
    Portal => "portal",
    FileExport => "file_export",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
    Testing,
}

impl_domain_status_conversions!(ConnectionStatus {
    Connected => "connected",
    Disconnected => "disconnected",
    Error => "error",
    Testing => "testing",
});

/// Credentials presented to the vendor
///
/// Secrets are referenced by environment variable name, never stored inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VendorAuth {
    #[default]
    None,
    ApiKey { header: String, key_env: String },
    Bearer { token_env: String },
    Basic { username: String, password_env: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorEndpoints {
    pub base_url: Option<String>,
    pub quote_path: Option<String>,
    pub order_path: Option<String>,
    pub health_path: Option<String>,
    /// Outbound directory for document-based integrations (EDI, email, file)
    pub drop_directory: Option<PathBuf>,
    pub order_email: Option<String>,
}

/// Rate-limit thresholds; `0` means unlimited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    /// Calls allowed within `window_secs`
    pub burst_limit: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1_000,
            requests_per_day: 10_000,
            burst_limit: 10,
            window_secs: 1,
        }
    }
}

impl RateLimitSettings {
    pub fn unlimited() -> Self {
        Self {
            requests_per_minute: 0,
            requests_per_hour: 0,
            requests_per_day: 0,
            burst_limit: 0,
            window_secs: 0,
        }
    }
}

/// Per-call timeout, retry and backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_initial_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_max_ms: u64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorCapabilities {
    pub batch: bool,
    pub real_time_inventory: bool,
    pub pricing: bool,
    pub availability: bool,
    pub ordering: bool,
}

impl Default for VendorCapabilities {
    fn default() -> Self {
        Self {
            batch: false,
            real_time_inventory: false,
            pricing: true,
            availability: true,
            ordering: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingPolicy {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for CachingPolicy {
    fn default() -> Self {
        Self { enabled: false, ttl_seconds: DEFAULT_QUOTE_CACHE_TTL_SECS }
    }
}

/// Cumulative request counters, maintained by the persistence layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub average_response_ms: f64,
}

/// Outcome of one vendor call, as fed into counters and the breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub success: bool,
    /// Whether the failure counts toward the breaker streak
    pub counts_toward_breaker: bool,
    pub response_ms: u64,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl CallOutcome {
    pub fn success(response_ms: u64, at: DateTime<Utc>) -> Self {
        Self { success: true, counts_toward_breaker: false, response_ms, error: None, at }
    }

    pub fn failure(error: impl Into<String>, response_ms: u64, at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            counts_toward_breaker: true,
            response_ms,
            error: Some(error.into()),
            at,
        }
    }

    /// A failure that is recorded in the counters without touching the
    /// breaker streak (malformed responses)
    pub fn soft_failure(error: impl Into<String>, response_ms: u64, at: DateTime<Utc>) -> Self {
        Self { counts_toward_breaker: false, ..Self::failure(error, response_ms, at) }
    }
}

/// One vendor integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorConfig {
    pub id: String,
    pub name: String,
    /// Short code used in PO numbers
    pub vendor_code: String,
    pub api_type: ApiType,
    #[serde(default)]
    pub auth: VendorAuth,
    #[serde(default)]
    pub endpoints: VendorEndpoints,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub call_policy: CallPolicy,
    #[serde(default)]
    pub capabilities: VendorCapabilities,
    #[serde(default)]
    pub caching: CachingPolicy,
    /// Lower ranks are preferred when quotes tie
    #[serde(default = "default_preference_rank")]
    pub preference_rank: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub stats: VendorStats,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_preference_rank() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

impl VendorConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        vendor_code: impl Into<String>,
        api_type: ApiType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor_code: vendor_code.into(),
            api_type,
            auth: VendorAuth::None,
            endpoints: VendorEndpoints::default(),
            rate_limits: RateLimitSettings::default(),
            call_policy: CallPolicy::default(),
            capabilities: VendorCapabilities::default(),
            caching: CachingPolicy::default(),
            preference_rank: default_preference_rank(),
            active: true,
            connection_status: ConnectionStatus::Disconnected,
            consecutive_failures: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            stats: VendorStats::default(),
            deleted_at: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PartSourceError::InvalidInput("vendor id must not be empty".into()));
        }
        if self.normalized_code().is_empty() {
            return Err(PartSourceError::InvalidInput(format!(
                "vendor '{}' needs an alphanumeric vendor code",
                self.id
            )));
        }
        if self.failure_threshold == 0 {
            return Err(PartSourceError::InvalidInput(format!(
                "vendor '{}' failure threshold must be at least 1",
                self.id
            )));
        }
        if self.rate_limits.burst_limit > 0 && self.rate_limits.window_secs == 0 {
            return Err(PartSourceError::InvalidInput(format!(
                "vendor '{}' burst limit needs a window",
                self.id
            )));
        }
        if self.api_type == ApiType::Rest && self.endpoints.base_url.is_none() {
            return Err(PartSourceError::InvalidInput(format!(
                "REST vendor '{}' needs a base url",
                self.id
            )));
        }
        Ok(())
    }

    /// Vendor code as it appears in PO numbers
    pub fn normalized_code(&self) -> String {
        let code: String = self.vendor_code.chars().filter(char::is_ascii_alphanumeric).collect();
        code.to_ascii_uppercase()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Static eligibility: active, not deleted and able to price parts.
    /// Breaker state is tracked by the rate limiter.
    pub fn can_quote(&self) -> bool {
        self.active && !self.is_deleted() && self.capabilities.pricing
    }
}
