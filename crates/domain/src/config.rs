//! Engine configuration
//!
//! Every section derives `serde(default)` so a partial TOML or JSON file
//! only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_MAX_CONCURRENT_CALLS,
    DEFAULT_MAX_SEQUENCE_ATTEMPTS, DEFAULT_PO_AUTO_APPROVE_LIMIT, DEFAULT_QUOTING_DEADLINE_SECS,
};
use crate::types::rules::EvaluationPolicy;
use crate::types::sourcing::SourcingConfig;
use crate::types::vendor::VendorConfig;
use crate::{PartSourceError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub orchestration: OrchestrationConfig,
    /// Defaults for requests that arrive without their own settings
    pub sourcing: SourcingConfig,
    pub evaluation: EvaluationPolicy,
    pub procurement: ProcurementConfig,
    pub health: HealthCheckConfig,
    pub logging: LoggingConfig,
    /// Vendors seeded into the store at startup
    pub vendors: Vec<VendorConfig>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(PartSourceError::Config("database.pool_size must be at least 1".into()));
        }
        if self.orchestration.max_concurrent_calls == 0 {
            return Err(PartSourceError::Config(
                "orchestration.max_concurrent_calls must be at least 1".into(),
            ));
        }
        if self.procurement.max_sequence_attempts == 0 {
            return Err(PartSourceError::Config(
                "procurement.max_sequence_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.procurement.default_tax_rate) {
            return Err(PartSourceError::Config(
                "procurement.default_tax_rate must be within [0, 1)".into(),
            ));
        }
        for vendor in &self.vendors {
            vendor.validate().map_err(|e| PartSourceError::Config(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "partsource.db".to_string(), pool_size: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Worker pool size shared by every in-flight sourcing request
    pub max_concurrent_calls: usize,
    /// Used when a vendor has no call timeout of its own
    pub default_call_timeout_ms: u64,
    pub default_quoting_deadline_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            default_call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            default_quoting_deadline_secs: DEFAULT_QUOTING_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcurementConfig {
    /// POs with a total below this are approved by the system
    pub po_auto_approve_limit: f64,
    pub max_sequence_attempts: u32,
    pub default_tax_rate: f64,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            po_auto_approve_limit: DEFAULT_PO_AUTO_APPROVE_LIMIT,
            max_sequence_attempts: DEFAULT_MAX_SEQUENCE_ATTEMPTS,
            default_tax_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { interval_secs: DEFAULT_HEALTH_INTERVAL_SECS, enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `partsource_core=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
