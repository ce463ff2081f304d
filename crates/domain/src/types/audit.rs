//! Append-only audit trail entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    SourcingRequest,
    PurchaseOrder,
    Vendor,
}

impl_domain_status_conversions!(EntityType {
    SourcingRequest => "sourcing_request",
    PurchaseOrder => "purchase_order",
    Vendor => "vendor",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StatusChanged,
    VendorAttempt,
    VendorRetry,
    VendorError,
    QuoteDiscarded,
    PoNumberConflict,
    LineWithdrawn,
    ReceiptRecorded,
    DiscrepancyFlagged,
    Reconciled,
}

impl_domain_status_conversions!(AuditAction {
    StatusChanged => "status_changed",
    VendorAttempt => "vendor_attempt",
    VendorRetry => "vendor_retry",
    VendorError => "vendor_error",
    QuoteDiscarded => "quote_discarded",
    PoNumberConflict => "po_number_conflict",
    LineWithdrawn => "line_withdrawn",
    ReceiptRecorded => "receipt_recorded",
    DiscrepancyFlagged => "discrepancy_flagged",
    Reconciled => "reconciled",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub detail: Value,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl ToString,
        action: AuditAction,
        actor: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type,
            entity_id: entity_id.to_string(),
            action,
            from_status: None,
            to_status: None,
            detail: Value::Null,
            actor: actor.into(),
            created_at,
        }
    }

    pub fn status_change(
        entity_type: EntityType,
        entity_id: impl ToString,
        from: impl ToString,
        to: impl ToString,
        actor: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut entry =
            Self::new(entity_type, entity_id, AuditAction::StatusChanged, actor, created_at);
        entry.from_status = Some(from.to_string());
        entry.to_status = Some(to.to_string());
        entry
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}
