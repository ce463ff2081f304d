//! Events emitted to dashboard and audit collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::purchase_order::{PoStatus, ReceivingStatus};
use super::sourcing::SourcingStatus;
use crate::constants::{EVENT_PO_GENERATED, EVENT_PO_RECEIVED, EVENT_SOURCING_STATUS_CHANGED};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EngineEvent {
    #[serde(rename = "sourcing.status_changed")]
    SourcingStatusChanged {
        request_id: Uuid,
        from: SourcingStatus,
        status: SourcingStatus,
        at: DateTime<Utc>,
    },
    #[serde(rename = "po.generated")]
    PoGenerated {
        purchase_order_id: Uuid,
        po_number: String,
        vendor_id: String,
        status: PoStatus,
        at: DateTime<Utc>,
    },
    #[serde(rename = "po.received")]
    PoReceived {
        purchase_order_id: Uuid,
        po_number: String,
        status: PoStatus,
        receiving_status: ReceivingStatus,
        percent_received: f64,
        has_discrepancy: bool,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourcingStatusChanged { .. } => EVENT_SOURCING_STATUS_CHANGED,
            Self::PoGenerated { .. } => EVENT_PO_GENERATED,
            Self::PoReceived { .. } => EVENT_PO_RECEIVED,
        }
    }

    /// Id of the entity the event is about
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::SourcingStatusChanged { request_id, .. } => *request_id,
            Self::PoGenerated { purchase_order_id, .. }
            | Self::PoReceived { purchase_order_id, .. } => *purchase_order_id,
        }
    }

    /// New status, as its persisted string
    pub fn status(&self) -> &'static str {
        match self {
            Self::SourcingStatusChanged { status, .. } => status.as_str(),
            Self::PoGenerated { status, .. } | Self::PoReceived { status, .. } => status.as_str(),
        }
    }
}
