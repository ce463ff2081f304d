//! Port interfaces for sourcing persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsource_domain::{Result, SourcingRequest, SourcingStatus, VendorQuote};
use uuid::Uuid;

/// Storage for sourcing requests and the quotes collected for them
///
/// `update` is optimistic: it succeeds only when the stored version equals
/// `request.version`, and returns the new version. A stale write fails with
/// `PartSourceError::Conflict`.
#[async_trait]
pub trait SourcingRequestRepository: Send + Sync {
    /// Insert a new request; a duplicate idempotency key is a `Conflict`
    async fn insert(&self, request: &SourcingRequest) -> Result<()>;

    async fn update(&self, request: &SourcingRequest) -> Result<i64>;

    async fn find(&self, id: Uuid) -> Result<Option<SourcingRequest>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<SourcingRequest>>;

    async fn list_by_status(&self, status: SourcingStatus) -> Result<Vec<SourcingRequest>>;

    /// Replace the stored quote set for a request
    async fn save_quotes(&self, request_id: Uuid, quotes: &[VendorQuote]) -> Result<()>;

    async fn quotes_for(&self, request_id: Uuid) -> Result<Vec<VendorQuote>>;

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}
