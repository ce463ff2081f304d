//! Common error types and classification shared by every PartSource crate.
//!
//! The error handling system is built on three pieces:
//!
//! 1. **`CommonError`**: the recurring, domain-free failure shapes (timeouts,
//!    rate limiting, serialization, invalid configuration, ...).
//! 2. **`ErrorClassification`**: a uniform way to ask an error whether it is
//!    retryable, how severe it is and whether the remote side asked us to
//!    wait before retrying.
//! 3. **`ErrorSeverity`**: a single severity scale used when logging.
//!
//! Crate-specific errors compose with `CommonError` rather than duplicating
//! its variants:
//!
//! ```rust
//! use std::time::Duration;
//!
//! use partsource_common::error::{CommonError, ErrorClassification, ErrorSeverity};
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! enum FeedError {
//!     #[error("feed is empty")]
//!     Empty,
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl ErrorClassification for FeedError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, Self::Common(e) if e.is_retryable())
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         match self {
//!             Self::Empty => ErrorSeverity::Info,
//!             Self::Common(e) => e.severity(),
//!         }
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         match self {
//!             Self::Common(e) => e.retry_after(),
//!             Self::Empty => None,
//!         }
//!     }
//! }
//!
//! let err = FeedError::from(CommonError::timeout("fetch", Duration::from_secs(2)));
//! assert!(err.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Standard result type using [`CommonError`]
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple crates
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommonError {
    /// Configuration is missing or invalid
    #[error("Configuration error{}: {message}", field_suffix(.field))]
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization failed
    #[error("Serialization error ({format}): {message}")]
    Serialization { message: String, format: String },

    /// File or database persistence failed
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// A rate limit was hit
    #[error("Rate limit exceeded{}", retry_suffix(.retry_after))]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// An operation did not finish in time
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// A remote service failed
    #[error("Backend error from '{service}': {message}")]
    Backend { service: String, message: String, is_retryable: bool },

    /// Input failed validation
    #[error("Validation error for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// A resource does not exist
    #[error("{resource_type} not found{}", id_suffix(.identifier))]
    NotFound { resource_type: String, identifier: Option<String> },

    /// An async task was cancelled before it completed
    #[error("Task '{task_id}' cancelled")]
    TaskCancelled { task_id: String },

    /// Invariant violation that should not normally happen
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!(" in field '{f}'")).unwrap_or_default()
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after.map(|d| format!(" (retry in {d:?})")).unwrap_or_default()
}

fn id_suffix(identifier: &Option<String>) -> String {
    identifier.as_ref().map(|id| format!(": '{id}'")).unwrap_or_default()
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error tied to a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    pub fn serialization<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: format.into() }
    }

    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence { message: message.into() }
    }

    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimitExceeded { retry_after }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn backend<S: Into<String>, M: Into<String>>(
        service: S,
        message: M,
        is_retryable: bool,
    ) -> Self {
        Self::Backend { service: service.into(), message: message.into(), is_retryable }
    }

    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn not_found_with_id<T: Into<String>, I: Into<String>>(
        resource_type: T,
        identifier: I,
    ) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: Some(identifier.into()) }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::NotFound { .. } | Self::TaskCancelled { .. } => ErrorSeverity::Info,
            Self::Internal { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Uniform classification interface for errors
pub trait ErrorClassification {
    /// Transient failures that may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Severity used for logging and alerting decisions
    fn severity(&self) -> ErrorSeverity;

    /// Critical errors indicate invariant violations or data corruption
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Delay requested by the failing side (for example a `Retry-After`
    /// header), if any
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON", err.to_string())
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization("TOML", err.to_string())
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_optional_context() {
        assert_eq!(
            CommonError::config_field("rate_limits.burst_limit", "must be positive").to_string(),
            "Configuration error in field 'rate_limits.burst_limit': must be positive"
        );
        assert_eq!(CommonError::config("missing").to_string(), "Configuration error: missing");
        assert_eq!(
            CommonError::not_found_with_id("Vendor", "napa").to_string(),
            "Vendor not found: 'napa'"
        );
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = CommonError::rate_limit(Some(Duration::from_secs(3)));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn backend_retryability_is_explicit() {
        assert!(CommonError::backend("vendor", "502", true).is_retryable());
        assert!(!CommonError::backend("vendor", "400", false).is_retryable());
    }

    #[test]
    fn internal_errors_are_critical() {
        assert!(CommonError::internal("boom").is_critical());
        assert!(!CommonError::validation("quantity", "zero").is_critical());
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let err: CommonError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CommonError::Serialization { ref format, .. } if format == "JSON"));
    }
}
