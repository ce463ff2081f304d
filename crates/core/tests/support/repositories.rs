//! In-memory implementations of the core persistence ports
//!
//! They enforce the same contracts as the SQLite repositories: unique
//! idempotency keys and PO numbers, optimistic versions and soft delete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use partsource_core::audit::{AuditLedger, EventPublisher};
use partsource_core::procurement::PurchaseOrderRepository;
use partsource_core::sourcing::SourcingRequestRepository;
use partsource_core::vendor::VendorRepository;
use partsource_domain::{
    AuditAction, AuditEntry, CallOutcome, ConnectionStatus, EngineEvent, EntityType,
    PartSourceError, PoStatus, PurchaseOrder, ReceivingEvent, Result as DomainResult,
    SourcingRequest, SourcingStatus, VendorConfig, VendorQuote,
};
use uuid::Uuid;

/// Vendor store with counters updated under one lock
#[derive(Default)]
pub struct MemoryVendorRepository {
    vendors: Mutex<HashMap<String, VendorConfig>>,
}

impl MemoryVendorRepository {
    pub fn get(&self, vendor_id: &str) -> Option<VendorConfig> {
        self.vendors.lock().get(vendor_id).cloned()
    }
}

#[async_trait]
impl VendorRepository for MemoryVendorRepository {
    async fn upsert(&self, vendor: &VendorConfig) -> DomainResult<()> {
        let mut vendors = self.vendors.lock();
        match vendors.get_mut(&vendor.id) {
            Some(stored) => {
                let stats = stored.stats.clone();
                let failures = stored.consecutive_failures;
                let status = stored.connection_status;
                *stored = vendor.clone();
                stored.stats = stats;
                stored.consecutive_failures = failures;
                stored.connection_status = status;
            }
            None => {
                vendors.insert(vendor.id.clone(), vendor.clone());
            }
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> DomainResult<Option<VendorConfig>> {
        Ok(self.vendors.lock().get(id).filter(|v| !v.is_deleted()).cloned())
    }

    async fn list(&self) -> DomainResult<Vec<VendorConfig>> {
        let mut vendors: Vec<VendorConfig> =
            self.vendors.lock().values().filter(|v| !v.is_deleted()).cloned().collect();
        vendors.sort_by(|a, b| a.preference_rank.cmp(&b.preference_rank).then(a.id.cmp(&b.id)));
        Ok(vendors)
    }

    async fn record_outcome(
        &self,
        vendor_id: &str,
        outcome: &CallOutcome,
        consecutive_failures: u32,
        connection_status: Option<ConnectionStatus>,
    ) -> DomainResult<()> {
        let mut vendors = self.vendors.lock();
        let vendor = vendors
            .get_mut(vendor_id)
            .ok_or_else(|| PartSourceError::not_found("vendor", vendor_id))?;
        let stats = &mut vendor.stats;
        let previous = stats.total_requests as f64;
        stats.total_requests += 1;
        stats.average_response_ms = (stats.average_response_ms * previous
            + outcome.response_ms as f64)
            / stats.total_requests as f64;
        if outcome.success {
            stats.successful_requests += 1;
            stats.last_success_at = Some(outcome.at);
        } else {
            stats.failed_requests += 1;
            stats.last_failure_at = Some(outcome.at);
            stats.last_error = outcome.error.clone();
        }
        vendor.consecutive_failures = consecutive_failures;
        if let Some(status) = connection_status {
            vendor.connection_status = status;
        }
        Ok(())
    }

    async fn set_connection_status(
        &self,
        vendor_id: &str,
        status: ConnectionStatus,
        consecutive_failures: u32,
    ) -> DomainResult<()> {
        let mut vendors = self.vendors.lock();
        let vendor = vendors
            .get_mut(vendor_id)
            .ok_or_else(|| PartSourceError::not_found("vendor", vendor_id))?;
        vendor.connection_status = status;
        vendor.consecutive_failures = consecutive_failures;
        Ok(())
    }

    async fn soft_delete(&self, vendor_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(vendor) = self.vendors.lock().get_mut(vendor_id) {
            vendor.deleted_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySourcingRepository {
    requests: Mutex<HashMap<Uuid, SourcingRequest>>,
    quotes: Mutex<HashMap<Uuid, Vec<VendorQuote>>>,
}

impl MemorySourcingRepository {
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Overwrite a stored request, bypassing the version check
    pub fn force(&self, request: SourcingRequest) {
        self.requests.lock().insert(request.id, request);
    }
}

#[async_trait]
impl SourcingRequestRepository for MemorySourcingRepository {
    async fn insert(&self, request: &SourcingRequest) -> DomainResult<()> {
        let mut requests = self.requests.lock();
        if requests.values().any(|r| r.idempotency_key == request.idempotency_key) {
            return Err(PartSourceError::Conflict(format!(
                "idempotency key {} already exists",
                request.idempotency_key
            )));
        }
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update(&self, request: &SourcingRequest) -> DomainResult<i64> {
        let mut requests = self.requests.lock();
        let stored = requests
            .get_mut(&request.id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or_else(|| PartSourceError::not_found("sourcing request", request.id))?;
        if stored.version != request.version {
            return Err(PartSourceError::Conflict(format!(
                "sourcing request {} is at version {}, not {}",
                request.id, stored.version, request.version
            )));
        }
        let version = request.version + 1;
        *stored = SourcingRequest { version, ..request.clone() };
        Ok(version)
    }

    async fn find(&self, id: Uuid) -> DomainResult<Option<SourcingRequest>> {
        Ok(self.requests.lock().get(&id).filter(|r| r.deleted_at.is_none()).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> DomainResult<Option<SourcingRequest>> {
        Ok(self
            .requests
            .lock()
            .values()
            .find(|r| r.idempotency_key == key && r.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_status(&self, status: SourcingStatus) -> DomainResult<Vec<SourcingRequest>> {
        let mut found: Vec<SourcingRequest> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.status == status && r.deleted_at.is_none())
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn save_quotes(&self, request_id: Uuid, quotes: &[VendorQuote]) -> DomainResult<()> {
        self.quotes.lock().insert(request_id, quotes.to_vec());
        Ok(())
    }

    async fn quotes_for(&self, request_id: Uuid) -> DomainResult<Vec<VendorQuote>> {
        Ok(self.quotes.lock().get(&request_id).cloned().unwrap_or_default())
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(request) = self.requests.lock().get_mut(&id) {
            request.deleted_at = Some(at);
        }
        Ok(())
    }
}

/// PO store with a unique PO number, like the SQL schema
#[derive(Default)]
pub struct MemoryPurchaseOrderRepository {
    orders: Mutex<HashMap<Uuid, PurchaseOrder>>,
    receipts: Mutex<Vec<ReceivingEvent>>,
    /// Inserts that fail with a conflict before any succeeds, simulating
    /// another process taking the number first
    forced_conflicts: AtomicUsize,
}

impl MemoryPurchaseOrderRepository {
    pub fn fail_next_inserts(&self, count: usize) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<PurchaseOrder> {
        let mut orders: Vec<PurchaseOrder> = self.orders.lock().values().cloned().collect();
        orders.sort_by(|a, b| a.po_number.cmp(&b.po_number));
        orders
    }
}

#[async_trait]
impl PurchaseOrderRepository for MemoryPurchaseOrderRepository {
    async fn insert(&self, po: &PurchaseOrder) -> DomainResult<()> {
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(PartSourceError::Conflict(format!("PO number {} is taken", po.po_number)));
        }
        let mut orders = self.orders.lock();
        if orders.values().any(|o| o.po_number == po.po_number) {
            return Err(PartSourceError::Conflict(format!("PO number {} is taken", po.po_number)));
        }
        orders.insert(po.id, po.clone());
        Ok(())
    }

    async fn update(&self, po: &PurchaseOrder) -> DomainResult<i64> {
        let mut orders = self.orders.lock();
        let stored = orders
            .get_mut(&po.id)
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| PartSourceError::not_found("purchase order", po.id))?;
        if stored.version != po.version {
            return Err(PartSourceError::Conflict(format!(
                "purchase order {} is at version {}, not {}",
                po.po_number, stored.version, po.version
            )));
        }
        let version = po.version + 1;
        *stored = PurchaseOrder { version, ..po.clone() };
        Ok(version)
    }

    async fn find(&self, id: Uuid) -> DomainResult<Option<PurchaseOrder>> {
        Ok(self.orders.lock().get(&id).filter(|o| o.deleted_at.is_none()).cloned())
    }

    async fn find_by_number(&self, po_number: &str) -> DomainResult<Option<PurchaseOrder>> {
        Ok(self
            .orders
            .lock()
            .values()
            .find(|o| o.po_number == po_number && o.deleted_at.is_none())
            .cloned())
    }

    async fn find_open_for_bucket(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> DomainResult<Option<PurchaseOrder>> {
        Ok(self
            .orders
            .lock()
            .values()
            .filter(|o| {
                o.repair_order_id == repair_order_id
                    && o.vendor_id == vendor_id
                    && o.bucket == bucket
                    && o.status.accepts_lines()
                    && o.deleted_at.is_none()
            })
            .min_by_key(|o| o.sequence)
            .cloned())
    }

    async fn find_by_sourcing_request(
        &self,
        request_id: Uuid,
    ) -> DomainResult<Option<PurchaseOrder>> {
        Ok(self
            .orders
            .lock()
            .values()
            .find(|o| {
                o.deleted_at.is_none()
                    && o.lines.iter().any(|l| l.sourcing_request_id == request_id)
            })
            .cloned())
    }

    async fn max_sequence(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> DomainResult<Option<u32>> {
        Ok(self
            .orders
            .lock()
            .values()
            .filter(|o| {
                o.repair_order_id == repair_order_id
                    && o.vendor_id == vendor_id
                    && o.bucket == bucket
            })
            .map(|o| o.sequence)
            .max())
    }

    async fn record_receipt(
        &self,
        po: &PurchaseOrder,
        event: &ReceivingEvent,
    ) -> DomainResult<i64> {
        let version = self.update(po).await?;
        self.receipts.lock().push(event.clone());
        Ok(version)
    }

    async fn receipts_for(&self, po_id: Uuid) -> DomainResult<Vec<ReceivingEvent>> {
        Ok(self
            .receipts
            .lock()
            .iter()
            .filter(|e| e.purchase_order_id == po_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: PoStatus) -> DomainResult<Vec<PurchaseOrder>> {
        Ok(self
            .orders
            .lock()
            .values()
            .filter(|o| o.status == status && o.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(po) = self.orders.lock().get_mut(&id) {
            po.deleted_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryLedger {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries.lock().iter().filter(|e| e.action == action).count()
    }
}

#[async_trait]
impl AuditLedger for MemoryLedger {
    async fn append(&self, entry: AuditEntry) -> DomainResult<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    async fn entries_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DomainResult<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(EngineEvent::name).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}
