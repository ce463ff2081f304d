//! Port interfaces for the audit trail and event stream

use async_trait::async_trait;
use partsource_domain::{AuditEntry, EngineEvent, EntityType, Result};

/// Append-only record of state transitions, retries and errors
#[async_trait]
pub trait AuditLedger: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Entries for one entity, oldest first
    async fn entries_for(&self, entity_type: EntityType, entity_id: &str)
        -> Result<Vec<AuditEntry>>;
}

/// Fan-out of engine events to dashboard and audit consumers
///
/// Publishing is fire-and-forget; a publisher with no subscribers drops
/// the event.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Publisher that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: EngineEvent) {}
}
