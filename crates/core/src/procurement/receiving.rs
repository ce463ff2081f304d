//! Receipts against purchase orders and discrepancy reconciliation

use std::sync::Arc;

use chrono::Utc;
use partsource_domain::{
    AuditAction, AuditEntry, DiscrepancyKind, EngineEvent, EntityType, PartSourceError,
    PoStatus, PurchaseOrder, ReceiptInput, ReceivingEvent, ReceivingStatus, Result,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ports::PurchaseOrderRepository;
use crate::audit::Auditor;

/// Attempts at writing a receipt against a PO that keeps changing
const MAX_RECEIPT_ATTEMPTS: usize = 5;

pub struct ReceivingReconciler {
    repository: Arc<dyn PurchaseOrderRepository>,
    auditor: Auditor,
}

impl ReceivingReconciler {
    pub fn new(repository: Arc<dyn PurchaseOrderRepository>, auditor: Auditor) -> Self {
        Self { repository, auditor }
    }

    /// Record a receipt and update the PO's receiving totals
    ///
    /// Over-receipt is never clamped: the PO is flagged and moves to
    /// `disputed` until someone reconciles it.
    #[instrument(skip(self, input), fields(quantity = input.quantity))]
    pub async fn record_receipt(
        &self,
        po_id: Uuid,
        input: ReceiptInput,
    ) -> Result<(PurchaseOrder, ReceivingEvent)> {
        let note = discrepancy_note(&input);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut po = self.load(po_id).await?;
            let now = Utc::now();
            let effect = po.apply_receipt(input.quantity, note.as_deref(), now)?;

            let discrepancy = match input.discrepancy {
                Some(kind) => Some(kind),
                None if po.receiving_status == ReceivingStatus::OverReceived => {
                    Some(DiscrepancyKind::OverReceived)
                }
                None => None,
            };
            let event = ReceivingEvent {
                id: Uuid::now_v7(),
                purchase_order_id: po.id,
                quantity_received: input.quantity,
                received_at: now,
                received_by: input.received_by.clone(),
                has_discrepancy: effect.discrepancy_flagged,
                discrepancy,
                notes: input.notes.clone(),
                percent_after: po.percent_received,
            };

            match self.repository.record_receipt(&po, &event).await {
                Ok(version) => po.version = version,
                Err(err) if err.is_conflict() && attempt < MAX_RECEIPT_ATTEMPTS => {
                    debug!(po_id = %po_id, attempt, "purchase order changed; retrying receipt");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let actor = input.received_by.as_deref().unwrap_or("receiving");
            let mut entry = AuditEntry::new(
                EntityType::PurchaseOrder,
                po.id,
                AuditAction::ReceiptRecorded,
                actor,
                now,
            );
            entry.from_status = Some(effect.previous_status.to_string());
            entry.to_status = Some(po.status.to_string());
            self.auditor
                .record(entry.with_detail(json!({
                    "receiving_event_id": event.id,
                    "quantity": event.quantity_received,
                    "total_received": po.total_received,
                    "percent_received": po.percent_received,
                })))
                .await;
            if effect.discrepancy_flagged {
                warn!(
                    po_number = %po.po_number,
                    total_received = po.total_received,
                    total_quantity = po.total_quantity,
                    "receiving discrepancy flagged"
                );
                let mut entry = AuditEntry::new(
                    EntityType::PurchaseOrder,
                    po.id,
                    AuditAction::DiscrepancyFlagged,
                    actor,
                    now,
                );
                entry.from_status = Some(effect.previous_status.to_string());
                entry.to_status = Some(po.status.to_string());
                self.auditor
                    .record(entry.with_detail(json!({
                        "discrepancy": event.discrepancy,
                        "notes": po.discrepancy_notes,
                    })))
                    .await;
            }
            self.publish_received(&po);

            info!(
                po_number = %po.po_number,
                receiving_status = %po.receiving_status,
                percent_received = po.percent_received,
                "receipt recorded"
            );
            return Ok((po, event));
        }
    }

    /// Clear an open discrepancy, restoring the status the receipts imply
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        po_id: Uuid,
        resolution: &str,
        by: &str,
    ) -> Result<PurchaseOrder> {
        let mut po = self.load(po_id).await?;
        let now = Utc::now();
        let from = po.reconcile(resolution, now)?;
        po.version = self.repository.update(&po).await?;

        let mut entry =
            AuditEntry::new(EntityType::PurchaseOrder, po.id, AuditAction::Reconciled, by, now);
        entry.from_status = Some(from.to_string());
        entry.to_status = Some(po.status.to_string());
        self.auditor.record(entry.with_detail(json!({ "resolution": resolution }))).await;
        self.publish_received(&po);
        info!(po_number = %po.po_number, status = %po.status, "discrepancy reconciled");
        Ok(po)
    }

    /// Close a fully received PO
    #[instrument(skip(self))]
    pub async fn close(&self, po_id: Uuid, by: &str) -> Result<PurchaseOrder> {
        let mut po = self.load(po_id).await?;
        if po.status != PoStatus::FullyReceived {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and cannot be closed",
                po.po_number, po.status
            )));
        }
        let now = Utc::now();
        let from = po.close(now)?;
        po.version = self.repository.update(&po).await?;
        self.auditor
            .record(AuditEntry::status_change(
                EntityType::PurchaseOrder,
                po.id,
                from,
                po.status,
                by,
                now,
            ))
            .await;
        Ok(po)
    }

    pub async fn receipts_for(&self, po_id: Uuid) -> Result<Vec<ReceivingEvent>> {
        self.repository.receipts_for(po_id).await
    }

    /// POs held for reconciliation
    pub async fn open_discrepancies(&self) -> Result<Vec<PurchaseOrder>> {
        self.repository.list_by_status(PoStatus::Disputed).await
    }

    async fn load(&self, po_id: Uuid) -> Result<PurchaseOrder> {
        self.repository
            .find(po_id)
            .await?
            .ok_or_else(|| PartSourceError::not_found("purchase order", po_id))
    }

    fn publish_received(&self, po: &PurchaseOrder) {
        self.auditor.publish(EngineEvent::PoReceived {
            purchase_order_id: po.id,
            po_number: po.po_number.clone(),
            status: po.status,
            receiving_status: po.receiving_status,
            percent_received: po.percent_received,
            has_discrepancy: po.has_discrepancy,
            at: po.updated_at,
        });
    }
}

fn discrepancy_note(input: &ReceiptInput) -> Option<String> {
    let kind = input.discrepancy?;
    Some(match input.notes.as_deref() {
        Some(notes) if !notes.trim().is_empty() => format!("{kind}: {}", notes.trim()),
        _ => kind.to_string(),
    })
}
