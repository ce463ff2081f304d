//! Command handlers behind the CLI
//!
//! Every handler returns a serializable report; `execute` renders it as
//! JSON for the caller.

pub mod procurement;
pub mod sourcing;
pub mod vendors;

use partsource_domain::{PartSourceError, ReceiptInput, Result};
use serde::Serialize;
use serde_json::Value;

use crate::cli::Command;
use crate::context::AppContext;

/// Run one command against the context
pub async fn execute(ctx: &AppContext, command: Command) -> Result<Value> {
    match command {
        Command::Process { file, automation, threshold } => {
            let items = sourcing::read_line_items(&file)?;
            to_json(&sourcing::process(ctx, &items, automation, threshold).await)
        }
        Command::Approve { request_id, quote, by } => {
            to_json(&sourcing::approve(ctx, request_id, quote, &by).await?)
        }
        Command::Reject { request_id, reason, by } => {
            to_json(&sourcing::reject(ctx, request_id, &reason, &by).await?)
        }
        Command::Cancel { request_id, reason, by } => {
            to_json(&sourcing::cancel(ctx, request_id, &reason, &by).await?)
        }
        Command::Pending => to_json(&sourcing::pending(ctx).await?),
        Command::PoSubmit { po } => to_json(&procurement::submit(ctx, &po).await?),
        Command::PoApprove { po, by, note } => {
            to_json(&procurement::approve(ctx, &po, &by, note).await?)
        }
        Command::PoCancel { po, reason, by } => {
            to_json(&procurement::cancel(ctx, &po, &reason, &by).await?)
        }
        Command::Transmit { po } => to_json(&procurement::transmit(ctx, &po).await?),
        Command::Acknowledge { po, reference } => {
            to_json(&procurement::acknowledge(ctx, &po, reference).await?)
        }
        Command::Receive { po, qty, by, discrepancy, note } => {
            let input = ReceiptInput { quantity: qty, received_by: by, discrepancy, notes: note };
            to_json(&procurement::receive(ctx, &po, input).await?)
        }
        Command::Reconcile { po, by, note } => {
            to_json(&procurement::reconcile(ctx, &po, &note, &by).await?)
        }
        Command::Close { po, by } => to_json(&procurement::close(ctx, &po, &by).await?),
        Command::Vendors => to_json(&vendors::list(ctx).await?),
        Command::HealthCheck { vendor } => {
            to_json(&vendors::health_check(ctx, vendor.as_deref()).await?)
        }
        Command::Monitor => {
            vendors::monitor(ctx).await?;
            Ok(Value::Null)
        }
    }
}

fn to_json<T: Serialize>(report: &T) -> Result<Value> {
    serde_json::to_value(report)
        .map_err(|e| PartSourceError::Internal(format!("failed to render report: {e}")))
}
