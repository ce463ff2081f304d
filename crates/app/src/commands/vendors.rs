//! Vendor status and health commands

use chrono::{DateTime, Utc};
use partsource_core::vendor::HealthReport;
use partsource_domain::{ApiType, ConnectionStatus, Result};
use serde::Serialize;
use tracing::info;

use crate::context::AppContext;

#[derive(Debug, Serialize)]
pub struct VendorStatus {
    pub id: String,
    pub name: String,
    pub vendor_code: String,
    pub api_type: ApiType,
    pub active: bool,
    pub connection_status: ConnectionStatus,
    pub circuit_open: bool,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub success_rate: Option<f64>,
    pub average_response_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Stored vendors with live breaker state
pub async fn list(ctx: &AppContext) -> Result<Vec<VendorStatus>> {
    let vendors = ctx.vendors.list().await?;
    Ok(vendors
        .into_iter()
        .map(|vendor| {
            let stats = &vendor.stats;
            #[allow(clippy::cast_precision_loss)]
            let success_rate = (stats.total_requests > 0)
                .then(|| stats.successful_requests as f64 / stats.total_requests as f64);
            VendorStatus {
                circuit_open: ctx.limiter.is_circuit_open(&vendor.id),
                consecutive_failures: ctx
                    .limiter
                    .consecutive_failures(&vendor.id)
                    .unwrap_or(vendor.consecutive_failures),
                total_requests: stats.total_requests,
                success_rate,
                average_response_ms: stats.average_response_ms,
                last_success_at: stats.last_success_at,
                last_error: stats.last_error.clone(),
                id: vendor.id,
                name: vendor.name,
                vendor_code: vendor.vendor_code,
                api_type: vendor.api_type,
                active: vendor.active,
                connection_status: vendor.connection_status,
            }
        })
        .collect())
}

/// Check one vendor, or every suspended vendor when none is named
pub async fn health_check(ctx: &AppContext, vendor: Option<&str>) -> Result<Vec<HealthReport>> {
    match vendor {
        Some(vendor_id) => Ok(vec![ctx.health.check_vendor(vendor_id).await?]),
        None => Ok(ctx.health.run_health_checks().await),
    }
}

/// Run the health scheduler until Ctrl-C
pub async fn monitor(ctx: &AppContext) -> Result<()> {
    let Some(mut scheduler) = ctx.start_health_scheduler().await? else {
        return Ok(());
    };
    info!(interval_secs = ctx.config.health.interval_secs, "monitoring vendor health");
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
    scheduler.stop().await?;
    Ok(())
}
