//! Sourcing requests and their state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line_item::{LineItem, SourcingConstraints, VehicleContext};
use super::quote::{QuoteCriteria, VendorQuote};
use crate::constants::{
    round_money, DEFAULT_APPROVAL_THRESHOLD, DEFAULT_MAX_RETRIES, DEFAULT_QUOTING_DEADLINE_SECS,
};
use crate::{impl_domain_status_conversions, PartSourceError, Result};

/// How much of the decision the engine may take on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationType {
    FullyAutomated,
    #[default]
    Assisted,
    ManualReviewRequired,
    ManualOnly,
}

impl_domain_status_conversions!(AutomationType {
    FullyAutomated => "fully_automated",
    Assisted => "assisted",
    ManualReviewRequired => "manual_review_required",
    ManualOnly => "manual_only",
});

impl AutomationType {
    /// Only fully automated requests skip human confirmation
    pub fn permits_auto_approval(self) -> bool {
        matches!(self, Self::FullyAutomated)
    }
}

/// Per-invocation settings passed with a line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcingConfig {
    pub automation_type: AutomationType,
    pub approval_threshold: f64,
    pub max_retries: u32,
    pub quoting_deadline_secs: u64,
}

impl Default for SourcingConfig {
    fn default() -> Self {
        Self {
            automation_type: AutomationType::Assisted,
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            quoting_deadline_secs: DEFAULT_QUOTING_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcingStatus {
    Pending,
    RequestingQuotes,
    QuotesReceived,
    Analyzed,
    Approved,
    Ordered,
    Cancelled,
    Timeout,
    Failed,
}

impl_domain_status_conversions!(SourcingStatus {
    Pending => "pending",
    RequestingQuotes => "requesting_quotes",
    QuotesReceived => "quotes_received",
    Analyzed => "analyzed",
    Approved => "approved",
    Ordered => "ordered",
    Cancelled => "cancelled",
    Timeout => "timeout",
    Failed => "failed",
});

impl SourcingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ordered | Self::Cancelled | Self::Timeout | Self::Failed)
    }

    pub fn can_transition_to(self, next: SourcingStatus) -> bool {
        use SourcingStatus::*;
        match (self, next) {
            (Pending, RequestingQuotes | Cancelled | Failed) => true,
            // Re-entering quoting after a crash mid-collection
            (RequestingQuotes, RequestingQuotes) => true,
            (RequestingQuotes, QuotesReceived | Failed | Timeout | Cancelled) => true,
            (QuotesReceived, Analyzed | Approved | Failed | Cancelled) => true,
            (Analyzed, Approved | Failed | Cancelled) => true,
            (Approved, Ordered | Cancelled) => true,
            _ => false,
        }
    }

    /// Whether a selected vendor may be recorded in this status
    pub fn holds_selection(self) -> bool {
        matches!(self, Self::Approved | Self::Ordered)
    }
}

/// One required part moving through quoting, decision and ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcingRequest {
    pub id: Uuid,
    pub idempotency_key: String,

    // Owning repair order and the part
    pub repair_order_id: String,
    pub repair_order_number: String,
    pub line_id: String,
    pub part_number: Option<String>,
    pub oem_part_number: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub quantity: u32,
    pub vehicle_context: VehicleContext,
    pub constraints: SourcingConstraints,

    // Decision settings
    pub automation_type: AutomationType,
    pub approval_threshold: f64,
    pub quoting_deadline_secs: u64,

    pub status: SourcingStatus,

    // Quote counters
    pub vendor_count: u32,
    pub quotes_received: u32,
    pub best_price: Option<f64>,
    pub average_price: Option<f64>,
    pub best_lead_time: Option<u32>,

    // Decision
    pub recommended_quote_id: Option<Uuid>,
    pub selected_vendor_id: Option<String>,
    pub selected_quote_id: Option<Uuid>,
    pub approved_by: Option<String>,
    pub purchase_order_id: Option<Uuid>,

    // Retry bookkeeping
    pub error_count: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failure_reason: Option<String>,

    // Stage timestamps
    pub created_at: DateTime<Utc>,
    pub quotes_requested_at: Option<DateTime<Utc>>,
    pub quotes_completed_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped by every persisted update
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SourcingRequest {
    pub fn new(item: &LineItem, config: &SourcingConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            idempotency_key: item.idempotency_key(),
            repair_order_id: item.repair_order_id.clone(),
            repair_order_number: item.repair_order_number.clone(),
            line_id: item.line_id.clone(),
            part_number: item.part_number.clone(),
            oem_part_number: item.oem_part_number.clone(),
            description: item.description.clone(),
            category: item.category.clone(),
            quantity: item.quantity,
            vehicle_context: item.vehicle_context.clone(),
            constraints: item.constraints.clone(),
            automation_type: config.automation_type,
            approval_threshold: config.approval_threshold,
            quoting_deadline_secs: config.quoting_deadline_secs,
            status: SourcingStatus::Pending,
            vendor_count: 0,
            quotes_received: 0,
            best_price: None,
            average_price: None,
            best_lead_time: None,
            recommended_quote_id: None,
            selected_vendor_id: None,
            selected_quote_id: None,
            approved_by: None,
            purchase_order_id: None,
            error_count: 0,
            retry_count: 0,
            max_retries: config.max_retries,
            next_retry_at: None,
            last_error: None,
            failure_reason: None,
            created_at: now,
            quotes_requested_at: None,
            quotes_completed_at: None,
            analyzed_at: None,
            approved_at: None,
            ordered_at: None,
            closed_at: None,
            updated_at: now,
            version: 0,
            deleted_at: None,
        }
    }

    pub fn criteria(&self) -> QuoteCriteria {
        QuoteCriteria {
            sourcing_request_id: self.id,
            part_number: self.part_number.clone(),
            oem_part_number: self.oem_part_number.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            quantity: self.quantity,
            vehicle: self.vehicle_context.clone(),
            acceptable_conditions: self.constraints.acceptable_conditions.clone(),
            acceptable_brand_types: self.constraints.acceptable_brand_types.clone(),
        }
    }

    /// Move to `next`, stamping the stage timestamp
    ///
    /// Returns the previous status. Leaving the approved/ordered states
    /// clears the selection so it never outlives the approval.
    pub fn transition(
        &mut self,
        next: SourcingStatus,
        now: DateTime<Utc>,
    ) -> Result<SourcingStatus> {
        let previous = self.status;
        if !previous.can_transition_to(next) {
            return Err(PartSourceError::InvalidTransition(format!(
                "sourcing request {} cannot move from {previous} to {next}",
                self.id
            )));
        }

        self.status = next;
        self.updated_at = now;
        match next {
            SourcingStatus::RequestingQuotes => self.quotes_requested_at = Some(now),
            SourcingStatus::QuotesReceived => self.quotes_completed_at = Some(now),
            SourcingStatus::Analyzed => self.analyzed_at = Some(now),
            SourcingStatus::Approved => self.approved_at = Some(now),
            SourcingStatus::Ordered => self.ordered_at = Some(now),
            SourcingStatus::Cancelled | SourcingStatus::Timeout | SourcingStatus::Failed => {
                self.closed_at = Some(now);
            }
            SourcingStatus::Pending => {}
        }
        if !next.holds_selection() {
            self.selected_vendor_id = None;
            self.selected_quote_id = None;
            self.approved_by = None;
        }
        Ok(previous)
    }

    /// Recompute the quote counters from every quote received so far
    pub fn record_quotes(&mut self, quotes: &[VendorQuote]) {
        let received = u32::try_from(quotes.len()).unwrap_or(u32::MAX);
        self.quotes_received = received;
        self.vendor_count = self.vendor_count.max(received);

        self.best_price = quotes.iter().map(|q| q.price).reduce(f64::min);
        self.average_price = if quotes.is_empty() {
            None
        } else {
            Some(round_money(quotes.iter().map(|q| q.price).sum::<f64>() / quotes.len() as f64))
        };
        self.best_lead_time = quotes.iter().map(|q| q.lead_time_days).min();
    }

    /// Approve `quote`; the caller decides whether this is allowed
    pub fn approve(
        &mut self,
        quote: &VendorQuote,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if quote.sourcing_request_id != self.id {
            return Err(PartSourceError::InvalidInput(format!(
                "quote {} does not belong to sourcing request {}",
                quote.id, self.id
            )));
        }
        self.transition(SourcingStatus::Approved, now)?;
        self.selected_vendor_id = Some(quote.vendor_id.clone());
        self.selected_quote_id = Some(quote.id);
        self.approved_by = Some(approver.to_string());
        Ok(())
    }

    /// Mark as ordered on purchase order `po_id`, keeping the selection
    pub fn mark_ordered(&mut self, po_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.transition(SourcingStatus::Ordered, now)?;
        self.purchase_order_id = Some(po_id);
        Ok(())
    }

    /// Persist an error on the request without changing status
    pub fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(message.into());
        self.updated_at = now;
    }

    /// Terminate with a reason (`failed` or `timeout`)
    pub fn fail(
        &mut self,
        status: SourcingStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reason = reason.into();
        self.transition(status, now)?;
        self.failure_reason = Some(reason.clone());
        self.record_error(reason, now);
        Ok(())
    }
}
