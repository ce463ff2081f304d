//! Port interfaces for purchase order persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsource_domain::{PoStatus, PurchaseOrder, ReceivingEvent, Result};
use uuid::Uuid;

/// Storage for purchase orders and their receipts
///
/// PO numbers are unique: `insert` of a taken number fails with
/// `PartSourceError::Conflict`, which is how concurrent sequence
/// allocation detects a collision. `update` is optimistic on
/// `PurchaseOrder::version` and returns the new version.
#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    async fn insert(&self, po: &PurchaseOrder) -> Result<()>;

    async fn update(&self, po: &PurchaseOrder) -> Result<i64>;

    async fn find(&self, id: Uuid) -> Result<Option<PurchaseOrder>>;

    async fn find_by_number(&self, po_number: &str) -> Result<Option<PurchaseOrder>>;

    /// Lowest-sequence PO for the group that still accepts lines
    async fn find_open_for_bucket(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> Result<Option<PurchaseOrder>>;

    /// PO holding the line for a sourcing request, if any
    async fn find_by_sourcing_request(&self, request_id: Uuid) -> Result<Option<PurchaseOrder>>;

    /// Highest sequence issued for the group, including cancelled POs
    async fn max_sequence(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> Result<Option<u32>>;

    /// Store a receipt together with the PO it changed, atomically
    ///
    /// Returns the new PO version; a stale PO is a `Conflict` and the
    /// receipt is not stored.
    async fn record_receipt(&self, po: &PurchaseOrder, event: &ReceivingEvent) -> Result<i64>;

    /// Receipts for a PO, oldest first
    async fn receipts_for(&self, po_id: Uuid) -> Result<Vec<ReceivingEvent>>;

    async fn list_by_status(&self, status: PoStatus) -> Result<Vec<PurchaseOrder>>;

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}
