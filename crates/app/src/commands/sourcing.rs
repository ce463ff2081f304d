//! Sourcing request commands

use std::path::Path;

use partsource_core::SourcingOutcome;
use partsource_domain::{
    AutomationType, LineItem, PartSourceError, Result, SourcingConfig, SourcingRequest,
    SourcingStatus,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::context::AppContext;

/// A line-item file holds one item or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum LineItemFile {
    Many(Vec<LineItem>),
    One(Box<LineItem>),
}

/// Result of sourcing one line item
#[derive(Debug, Serialize)]
pub struct LineReport {
    pub line_id: String,
    pub request_id: Option<Uuid>,
    pub status: Option<SourcingStatus>,
    pub quotes_received: u32,
    pub best_price: Option<f64>,
    pub recommended_quote_id: Option<Uuid>,
    pub selected_vendor_id: Option<String>,
    pub purchase_order: Option<String>,
    pub failure_reason: Option<String>,
    pub error: Option<String>,
}

impl LineReport {
    fn from_request(request: &SourcingRequest, purchase_order: Option<String>) -> Self {
        Self {
            line_id: request.line_id.clone(),
            request_id: Some(request.id),
            status: Some(request.status),
            quotes_received: request.quotes_received,
            best_price: request.best_price,
            recommended_quote_id: request.recommended_quote_id,
            selected_vendor_id: request.selected_vendor_id.clone(),
            purchase_order,
            failure_reason: request.failure_reason.clone(),
            error: None,
        }
    }

    fn from_outcome(outcome: &SourcingOutcome) -> Self {
        let po_number = outcome.purchase_order.as_ref().map(|po| po.po_number.clone());
        Self::from_request(&outcome.request, po_number)
    }

    fn failed(line_id: &str, error: &PartSourceError) -> Self {
        Self {
            line_id: line_id.to_string(),
            request_id: None,
            status: None,
            quotes_received: 0,
            best_price: None,
            recommended_quote_id: None,
            selected_vendor_id: None,
            purchase_order: None,
            failure_reason: None,
            error: Some(error.to_string()),
        }
    }
}

/// Read line items from a JSON file
pub fn read_line_items(path: &Path) -> Result<Vec<LineItem>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PartSourceError::InvalidInput(format!("cannot read {}: {e}", path.display()))
    })?;
    let parsed: LineItemFile = serde_json::from_str(&contents).map_err(|e| {
        PartSourceError::InvalidInput(format!("{} is not a line-item file: {e}", path.display()))
    })?;
    Ok(match parsed {
        LineItemFile::Many(items) => items,
        LineItemFile::One(item) => vec![*item],
    })
}

/// Source every line; one failing line does not stop the rest
pub async fn process(
    ctx: &AppContext,
    items: &[LineItem],
    automation: Option<AutomationType>,
    threshold: Option<f64>,
) -> Vec<LineReport> {
    let mut config: SourcingConfig = ctx.config.sourcing.clone();
    if let Some(automation) = automation {
        config.automation_type = automation;
    }
    if let Some(threshold) = threshold {
        config.approval_threshold = threshold;
    }

    let mut reports = Vec::with_capacity(items.len());
    for item in items {
        match ctx.sourcing.process_sourcing_request(item, &config).await {
            Ok(outcome) => reports.push(LineReport::from_outcome(&outcome)),
            Err(err) => {
                warn!(line_id = %item.line_id, error = %err, "line item not sourced");
                reports.push(LineReport::failed(&item.line_id, &err));
            }
        }
    }
    reports
}

pub async fn approve(
    ctx: &AppContext,
    request_id: Uuid,
    quote_id: Option<Uuid>,
    approver: &str,
) -> Result<LineReport> {
    let outcome = ctx.sourcing.approve_manually(request_id, quote_id, approver).await?;
    Ok(LineReport::from_outcome(&outcome))
}

pub async fn reject(
    ctx: &AppContext,
    request_id: Uuid,
    reason: &str,
    by: &str,
) -> Result<LineReport> {
    let request = ctx.sourcing.reject(request_id, reason, by).await?;
    Ok(LineReport::from_request(&request, None))
}

pub async fn cancel(
    ctx: &AppContext,
    request_id: Uuid,
    reason: &str,
    by: &str,
) -> Result<LineReport> {
    let request = ctx.sourcing.cancel_request(request_id, reason, by).await?;
    Ok(LineReport::from_request(&request, None))
}

/// Analyzed requests waiting for a human decision
pub async fn pending(ctx: &AppContext) -> Result<Vec<LineReport>> {
    let requests = ctx.sourcing.awaiting_approval().await?;
    Ok(requests.iter().map(|request| LineReport::from_request(request, None)).collect())
}
