//! Audit trail and event emission shared by every engine stage

pub mod ports;

use std::sync::Arc;

use partsource_domain::{AuditEntry, EngineEvent};
use tracing::{debug, error};

pub use ports::{AuditLedger, EventPublisher, NoopEventPublisher};

/// Writes audit entries and publishes events on behalf of the services
///
/// A failed audit write is logged at error level and does not abort the
/// business operation that produced it.
#[derive(Clone)]
pub struct Auditor {
    ledger: Arc<dyn AuditLedger>,
    events: Arc<dyn EventPublisher>,
}

impl Auditor {
    pub fn new(ledger: Arc<dyn AuditLedger>, events: Arc<dyn EventPublisher>) -> Self {
        Self { ledger, events }
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }

    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let entity_id = entry.entity_id.clone();
        if let Err(err) = self.ledger.append(entry).await {
            error!(error = %err, %action, entity_id = %entity_id, "failed to append audit entry");
        }
    }

    pub fn publish(&self, event: EngineEvent) {
        debug!(
            event = event.name(),
            entity_id = %event.entity_id(),
            status = event.status(),
            "publishing engine event"
        );
        self.events.publish(event);
    }
}
