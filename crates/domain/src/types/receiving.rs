//! Receipt events recorded against purchase orders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    OverReceived,
    Damaged,
    WrongPart,
    Other,
}

impl_domain_status_conversions!(DiscrepancyKind {
    OverReceived => "over_received",
    Damaged => "damaged",
    WrongPart => "wrong_part",
    Other => "other",
});

/// Receipt as reported by the receiving clerk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptInput {
    pub quantity: u32,
    #[serde(default)]
    pub received_by: Option<String>,
    /// Explicit problem noticed at the dock
    #[serde(default)]
    pub discrepancy: Option<DiscrepancyKind>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReceiptInput {
    pub fn quantity(quantity: u32) -> Self {
        Self { quantity, received_by: None, discrepancy: None, notes: None }
    }
}

/// Persisted receipt; never created before its purchase order exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivingEvent {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub quantity_received: u32,
    pub received_at: DateTime<Utc>,
    pub received_by: Option<String>,
    pub has_discrepancy: bool,
    pub discrepancy: Option<DiscrepancyKind>,
    pub notes: Option<String>,
    /// PO percent received after this event
    pub percent_after: f64,
}
