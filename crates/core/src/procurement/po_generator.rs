//! Purchase order generation, approval and transmission
//!
//! Approved sourcing requests are grouped by repair order, vendor and
//! year-month bucket. A request joins the bucket's open PO when one still
//! accepts lines; otherwise the next sequence number for the bucket is
//! allocated. Allocation is serialized per bucket inside the process, and
//! the store's unique PO number catches collisions with other processes:
//! a collision is logged, audited and retried with a fresh candidate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use partsource_domain::{
    constants::SYSTEM_ACTOR, AuditAction, AuditEntry, EngineEvent, EntityType, PartSourceError,
    PoNumber, PoStatus, ProcurementConfig, PurchaseOrder, PurchaseOrderLine, Result,
    SourcingRequest, VendorConfig, VendorQuote,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ports::PurchaseOrderRepository;
use crate::audit::Auditor;
use crate::locks::KeyedLocks;
use crate::vendor::{OrderRequest, VendorAdapterRegistry};

pub struct PurchaseOrderGenerator {
    repository: Arc<dyn PurchaseOrderRepository>,
    registry: Arc<VendorAdapterRegistry>,
    auditor: Auditor,
    config: ProcurementConfig,
    locks: KeyedLocks,
}

impl PurchaseOrderGenerator {
    pub fn new(
        repository: Arc<dyn PurchaseOrderRepository>,
        registry: Arc<VendorAdapterRegistry>,
        auditor: Auditor,
        config: ProcurementConfig,
    ) -> Self {
        Self { repository, registry, auditor, config, locks: KeyedLocks::default() }
    }

    /// Put an approved quote on a purchase order
    ///
    /// Idempotent per sourcing request: a request already on a PO gets that
    /// PO back and nothing is written.
    #[instrument(skip_all, fields(request_id = %request.id, vendor_id = %vendor.id))]
    pub async fn add_approved_line(
        &self,
        request: &SourcingRequest,
        quote: &VendorQuote,
        vendor: &VendorConfig,
    ) -> Result<PurchaseOrder> {
        if quote.sourcing_request_id != request.id || quote.vendor_id != vendor.id {
            return Err(PartSourceError::InvalidInput(format!(
                "quote {} does not belong to request {} and vendor '{}'",
                quote.id, request.id, vendor.id
            )));
        }

        let now = Utc::now();
        let bucket = PoNumber::bucket_for(now);
        let _guard = self
            .locks
            .lock(format!("bucket:{}:{}:{bucket}", request.repair_order_id, vendor.id))
            .await;

        if let Some(existing) = self.repository.find_by_sourcing_request(request.id).await? {
            debug!(po_number = %existing.po_number, "request already on a purchase order");
            return Ok(existing);
        }

        for attempt in 1..=self.config.max_sequence_attempts {
            let line = PurchaseOrderLine::from_quote(request, quote);

            if let Some(mut po) = self
                .repository
                .find_open_for_bucket(&request.repair_order_id, &vendor.id, &bucket)
                .await?
            {
                po.add_line(line, now)?;
                match self.repository.update(&po).await {
                    Ok(version) => {
                        po.version = version;
                        info!(po_number = %po.po_number, lines = po.lines.len(), "line appended");
                        return Ok(po);
                    }
                    Err(err) if err.is_conflict() => {
                        debug!(po_number = %po.po_number, attempt, "open PO changed; retrying");
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            let sequence = self
                .repository
                .max_sequence(&request.repair_order_id, &vendor.id, &bucket)
                .await?
                .unwrap_or(0)
                + 1;
            let mut po =
                PurchaseOrder::new(request, vendor, sequence, self.config.default_tax_rate, now);
            po.add_line(line, now)?;
            match self.repository.insert(&po).await {
                Ok(()) => {
                    info!(po_number = %po.po_number, sequence, "purchase order created");
                    self.auditor
                        .record(
                            AuditEntry::new(
                                EntityType::PurchaseOrder,
                                po.id,
                                AuditAction::StatusChanged,
                                SYSTEM_ACTOR,
                                now,
                            )
                            .with_detail(json!({
                                "po_number": po.po_number,
                                "sourcing_request_id": request.id,
                            })),
                        )
                        .await;
                    self.auditor.publish(EngineEvent::PoGenerated {
                        purchase_order_id: po.id,
                        po_number: po.po_number.clone(),
                        vendor_id: po.vendor_id.clone(),
                        status: po.status,
                        at: now,
                    });
                    return Ok(po);
                }
                Err(err) if err.is_conflict() => {
                    warn!(po_number = %po.po_number, attempt, "PO number taken; retrying");
                    self.auditor
                        .record(
                            AuditEntry::new(
                                EntityType::PurchaseOrder,
                                &po.po_number,
                                AuditAction::PoNumberConflict,
                                SYSTEM_ACTOR,
                                now,
                            )
                            .with_detail(json!({ "sequence": sequence, "attempt": attempt })),
                        )
                        .await;
                }
                Err(err) => return Err(err),
            }
        }

        Err(PartSourceError::Conflict(format!(
            "no PO number allocated for repair order {} and vendor '{}' after {} attempts",
            request.repair_order_number, vendor.id, self.config.max_sequence_attempts
        )))
    }

    /// Take a cancelled request's line back off its purchase order
    ///
    /// Refused once the PO has been approved. A PO left without lines is
    /// cancelled. Returns `None` when the request is on no PO.
    #[instrument(skip(self))]
    pub async fn withdraw_line(
        &self,
        request_id: Uuid,
        reason: &str,
        by: &str,
    ) -> Result<Option<PurchaseOrder>> {
        for attempt in 1..=self.config.max_sequence_attempts {
            let Some(found) = self.repository.find_by_sourcing_request(request_id).await? else {
                return Ok(None);
            };
            let _guard = self.locks.lock(format!("po:{}", found.id)).await;

            let mut po = self.load(found.id).await?;
            if po.status == PoStatus::Cancelled {
                return Ok(None);
            }
            if !po.lines.iter().any(|line| line.sourcing_request_id == request_id) {
                continue;
            }
            let now = Utc::now();
            let line = po.remove_line(request_id, now)?;
            let from = po.status;
            if po.lines.is_empty() {
                po.cancel(&format!("last line withdrawn: {reason}"), now)?;
            }
            match self.commit(&mut po, from, by, json!({ "reason": reason })).await {
                Ok(()) => {
                    info!(
                        po_number = %po.po_number,
                        remaining = po.lines.len(),
                        "line withdrawn from purchase order"
                    );
                    self.auditor
                        .record(
                            AuditEntry::new(
                                EntityType::PurchaseOrder,
                                po.id,
                                AuditAction::LineWithdrawn,
                                by,
                                now,
                            )
                            .with_detail(json!({
                                "sourcing_request_id": request_id,
                                "line_id": line.line_id,
                                "reason": reason,
                                "total": po.total_amount,
                            })),
                        )
                        .await;
                    return Ok(Some(po));
                }
                Err(err) if err.is_conflict() => {
                    debug!(po_number = %po.po_number, attempt, "PO changed while withdrawing");
                }
                Err(err) => return Err(err),
            }
        }
        Err(PartSourceError::Conflict(format!(
            "could not withdraw sourcing request {request_id} from its purchase order after {} \
             attempts",
            self.config.max_sequence_attempts
        )))
    }

    /// Move a draft PO to approval; totals under the auto-approve limit are
    /// approved by the system straight away
    #[instrument(skip(self))]
    pub async fn submit_for_approval(&self, po_id: Uuid) -> Result<PurchaseOrder> {
        let _guard = self.locks.lock(format!("po:{po_id}")).await;

        let mut po = self.load(po_id).await?;
        let now = Utc::now();
        let from = po.transition(PoStatus::PendingApproval, now)?;
        self.commit(&mut po, from, SYSTEM_ACTOR, Value::Null).await?;

        if po.total_amount < self.config.po_auto_approve_limit {
            info!(
                po_number = %po.po_number,
                total = po.total_amount,
                limit = self.config.po_auto_approve_limit,
                "purchase order auto-approved"
            );
            self.grant_approval(&mut po, SYSTEM_ACTOR, None, true, now)?;
            let detail = json!({ "auto_approved": true, "total": po.total_amount });
            self.commit(&mut po, PoStatus::PendingApproval, SYSTEM_ACTOR, detail).await?;
        }
        Ok(po)
    }

    #[instrument(skip(self, notes))]
    pub async fn approve(
        &self,
        po_id: Uuid,
        approver: &str,
        notes: Option<String>,
    ) -> Result<PurchaseOrder> {
        let _guard = self.locks.lock(format!("po:{po_id}")).await;

        let mut po = self.load(po_id).await?;
        if po.status != PoStatus::PendingApproval {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and not awaiting approval",
                po.po_number, po.status
            )));
        }
        let from = po.status;
        self.grant_approval(&mut po, approver, notes, false, Utc::now())?;
        self.commit(&mut po, from, approver, Value::Null).await?;
        Ok(po)
    }

    fn grant_approval(
        &self,
        po: &mut PurchaseOrder,
        approver: &str,
        notes: Option<String>,
        auto_approved: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        po.transition(PoStatus::Approved, now)?;
        po.approval.approved_by = Some(approver.to_string());
        po.approval.approved_at = Some(now);
        po.approval.notes = notes;
        po.approval.auto_approved = auto_approved;
        Ok(())
    }

    /// Send an approved PO through the vendor's adapter
    ///
    /// A PO that has already gone out is returned untouched. A failed send
    /// leaves the PO approved with the attempt and error recorded.
    #[instrument(skip(self))]
    pub async fn transmit(&self, po_id: Uuid) -> Result<PurchaseOrder> {
        let _guard = self.locks.lock(format!("po:{po_id}")).await;

        let mut po = self.load(po_id).await?;
        if po.status.is_transmitted() {
            debug!(po_number = %po.po_number, status = %po.status, "already transmitted");
            return Ok(po);
        }
        if po.status != PoStatus::Approved {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and cannot be transmitted",
                po.po_number, po.status
            )));
        }

        let vendor = self.registry.config_for(&po.vendor_id)?;
        if !vendor.capabilities.ordering {
            return Err(PartSourceError::Vendor(format!(
                "vendor '{}' does not accept electronic orders",
                vendor.id
            )));
        }
        let adapter = self.registry.adapter_for(&po.vendor_id)?;

        let now = Utc::now();
        po.transmission.attempts = po.transmission.attempts.saturating_add(1);
        po.transmission.method = Some(adapter.api_type());
        match adapter.place_order(&OrderRequest::from(&po)).await {
            Ok(confirmation) => {
                po.transmission.sent_at = Some(now);
                po.transmission.last_error = None;
                po.transmission.confirmation_number = Some(confirmation.confirmation_number);
                let from = po.transition(PoStatus::Sent, now)?;
                let detail = json!({
                    "confirmation_number": po.transmission.confirmation_number,
                    "method": po.transmission.method,
                });
                self.commit(&mut po, from, SYSTEM_ACTOR, detail).await?;
                info!(po_number = %po.po_number, "purchase order transmitted");
                Ok(po)
            }
            Err(err) => {
                warn!(po_number = %po.po_number, error = %err, "transmission failed");
                po.transmission.last_error = Some(err.to_string());
                po.updated_at = now;
                let from = po.status;
                self.commit(&mut po, from, SYSTEM_ACTOR, Value::Null).await?;
                self.auditor
                    .record(
                        AuditEntry::new(
                            EntityType::PurchaseOrder,
                            po.id,
                            AuditAction::VendorError,
                            SYSTEM_ACTOR,
                            now,
                        )
                        .with_detail(json!({
                            "operation": "place_order",
                            "error": err.to_string(),
                            "attempts": po.transmission.attempts,
                        })),
                    )
                    .await;
                Err(err.into())
            }
        }
    }

    /// Record the vendor's acknowledgement of a sent PO
    #[instrument(skip(self))]
    pub async fn acknowledge(
        &self,
        po_id: Uuid,
        acknowledgement: Option<String>,
    ) -> Result<PurchaseOrder> {
        let _guard = self.locks.lock(format!("po:{po_id}")).await;

        let mut po = self.load(po_id).await?;
        let now = Utc::now();
        let from = po.transition(PoStatus::Acknowledged, now)?;
        po.transmission.acknowledged_at = Some(now);
        po.transmission.acknowledgement = acknowledgement;
        self.commit(&mut po, from, SYSTEM_ACTOR, Value::Null).await?;
        Ok(po)
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, po_id: Uuid, reason: &str, by: &str) -> Result<PurchaseOrder> {
        let _guard = self.locks.lock(format!("po:{po_id}")).await;

        let mut po = self.load(po_id).await?;
        let from = po.cancel(reason, Utc::now())?;
        self.commit(&mut po, from, by, json!({ "reason": reason })).await?;
        Ok(po)
    }

    pub async fn find(&self, po_id: Uuid) -> Result<Option<PurchaseOrder>> {
        self.repository.find(po_id).await
    }

    pub async fn find_by_number(&self, po_number: &str) -> Result<Option<PurchaseOrder>> {
        self.repository.find_by_number(po_number).await
    }

    async fn load(&self, po_id: Uuid) -> Result<PurchaseOrder> {
        self.repository
            .find(po_id)
            .await?
            .ok_or_else(|| PartSourceError::not_found("purchase order", po_id))
    }

    async fn commit(
        &self,
        po: &mut PurchaseOrder,
        from: PoStatus,
        actor: &str,
        detail: Value,
    ) -> Result<()> {
        po.version = self.repository.update(po).await?;
        if po.status == from {
            return Ok(());
        }
        let mut entry = AuditEntry::status_change(
            EntityType::PurchaseOrder,
            po.id,
            from,
            po.status,
            actor,
            po.updated_at,
        );
        if !detail.is_null() {
            entry = entry.with_detail(detail);
        }
        self.auditor.record(entry).await;
        Ok(())
    }
}
