//! Purchase order commands

use chrono::{DateTime, Utc};
use partsource_domain::{PoStatus, PurchaseOrder, ReceiptInput, ReceivingStatus, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::context::AppContext;

#[derive(Debug, Serialize)]
pub struct PurchaseOrderSummary {
    pub id: Uuid,
    pub po_number: String,
    pub vendor_id: String,
    pub status: PoStatus,
    pub lines: usize,
    pub total_amount: f64,
    pub total_quantity: u32,
    pub total_received: u32,
    pub receiving_status: ReceivingStatus,
    pub has_discrepancy: bool,
    pub confirmation_number: Option<String>,
    pub expected_delivery: Option<DateTime<Utc>>,
}

impl From<&PurchaseOrder> for PurchaseOrderSummary {
    fn from(po: &PurchaseOrder) -> Self {
        Self {
            id: po.id,
            po_number: po.po_number.clone(),
            vendor_id: po.vendor_id.clone(),
            status: po.status,
            lines: po.lines.len(),
            total_amount: po.total_amount,
            total_quantity: po.total_quantity,
            total_received: po.total_received,
            receiving_status: po.receiving_status,
            has_discrepancy: po.has_discrepancy,
            confirmation_number: po.transmission.confirmation_number.clone(),
            expected_delivery: po.delivery.expected_delivery_date,
        }
    }
}

pub async fn submit(ctx: &AppContext, reference: &str) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.purchase_orders.submit_for_approval(po.id).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn approve(
    ctx: &AppContext,
    reference: &str,
    approver: &str,
    notes: Option<String>,
) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.purchase_orders.approve(po.id, approver, notes).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn cancel(
    ctx: &AppContext,
    reference: &str,
    reason: &str,
    by: &str,
) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.purchase_orders.cancel(po.id, reason, by).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

/// Send to the vendor; a PO that was already sent is returned unchanged
pub async fn transmit(ctx: &AppContext, reference: &str) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.purchase_orders.transmit(po.id).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn acknowledge(
    ctx: &AppContext,
    reference: &str,
    acknowledgement: Option<String>,
) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.purchase_orders.acknowledge(po.id, acknowledgement).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn receive(
    ctx: &AppContext,
    reference: &str,
    input: ReceiptInput,
) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let (po, _event) = ctx.receiving.record_receipt(po.id, input).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn reconcile(
    ctx: &AppContext,
    reference: &str,
    resolution: &str,
    by: &str,
) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.receiving.reconcile(po.id, resolution, by).await?;
    Ok(PurchaseOrderSummary::from(&po))
}

pub async fn close(ctx: &AppContext, reference: &str, by: &str) -> Result<PurchaseOrderSummary> {
    let po = ctx.resolve_purchase_order(reference).await?;
    let po = ctx.receiving.close(po.id, by).await?;
    Ok(PurchaseOrderSummary::from(&po))
}
