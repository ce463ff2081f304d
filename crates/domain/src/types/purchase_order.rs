//! Purchase orders, PO numbering and receiving status

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quote::{PartCondition, VendorQuote};
use super::sourcing::SourcingRequest;
use super::vendor::{ApiType, VendorConfig};
use crate::constants::{round_money, PO_SEQUENCE_MIN_WIDTH};
use crate::{impl_domain_status_conversions, PartSourceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    Draft,
    PendingApproval,
    Approved,
    Sent,
    Acknowledged,
    PartialReceived,
    FullyReceived,
    Closed,
    Cancelled,
    Disputed,
}

impl_domain_status_conversions!(PoStatus {
    Draft => "draft",
    PendingApproval => "pending_approval",
    Approved => "approved",
    Sent => "sent",
    Acknowledged => "acknowledged",
    PartialReceived => "partial_received",
    FullyReceived => "fully_received",
    Closed => "closed",
    Cancelled => "cancelled",
    Disputed => "disputed",
});

impl PoStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: PoStatus) -> bool {
        use PoStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Cancelled) => true,
            (Disputed, Disputed) => false,
            (_, Disputed) => true,
            (Draft, PendingApproval) => true,
            (PendingApproval, Approved) => true,
            (Approved, Sent) => true,
            (Sent, Acknowledged | PartialReceived | FullyReceived) => true,
            (Acknowledged, PartialReceived | FullyReceived) => true,
            (PartialReceived, FullyReceived) => true,
            (FullyReceived, Closed) => true,
            // Reconciliation restores the status the receipts imply
            (Disputed, next) => !next.is_terminal(),
            _ => false,
        }
    }

    /// Lines may only be appended before the PO is approved
    pub fn accepts_lines(self) -> bool {
        matches!(self, Self::Draft | Self::PendingApproval)
    }

    /// Goods may be received once the order has gone out
    pub fn accepts_receipts(self) -> bool {
        matches!(
            self,
            Self::Sent
                | Self::Acknowledged
                | Self::PartialReceived
                | Self::FullyReceived
                | Self::Disputed
        )
    }

    /// Already handed to the vendor; transmission must not repeat
    pub fn is_transmitted(self) -> bool {
        matches!(
            self,
            Self::Sent
                | Self::Acknowledged
                | Self::PartialReceived
                | Self::FullyReceived
                | Self::Closed
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivingStatus {
    #[default]
    NotStarted,
    Partial,
    Complete,
    OverReceived,
}

impl_domain_status_conversions!(ReceivingStatus {
    NotStarted => "not_started",
    Partial => "partial",
    Complete => "complete",
    OverReceived => "over_received",
});

impl ReceivingStatus {
    pub fn from_percent(percent: f64) -> Self {
        if percent <= 0.0 {
            Self::NotStarted
        } else if percent < 100.0 {
            Self::Partial
        } else if percent == 100.0 {
            Self::Complete
        } else {
            Self::OverReceived
        }
    }
}

/// Structured PO number `RO-YYMM-VENDORCODE-NNN`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoNumber {
    pub repair_order: String,
    /// `YYMM` of the generation month (UTC)
    pub bucket: String,
    pub vendor_code: String,
    pub sequence: u32,
}

impl PoNumber {
    pub fn new(repair_order_number: &str, bucket: &str, vendor_code: &str, sequence: u32) -> Self {
        Self {
            repair_order: normalize_segment(repair_order_number),
            bucket: bucket.to_string(),
            vendor_code: normalize_segment(vendor_code),
            sequence,
        }
    }

    /// Year-month bucket for `at`
    pub fn bucket_for(at: DateTime<Utc>) -> String {
        at.format("%y%m").to_string()
    }
}

impl fmt::Display for PoNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:0width$}",
            self.repair_order,
            self.bucket,
            self.vendor_code,
            self.sequence,
            width = PO_SEQUENCE_MIN_WIDTH
        )
    }
}

impl FromStr for PoNumber {
    type Err = PartSourceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PartSourceError::InvalidInput(format!("malformed PO number '{s}'"));
        let parts: Vec<&str> = s.split('-').collect();
        let [ro, bucket, code, seq] = parts.as_slice() else {
            return Err(invalid());
        };
        let alnum = |segment: &str| {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric())
        };
        if !alnum(*ro) || !alnum(*code) {
            return Err(invalid());
        }
        if bucket.len() != 4 || !bucket.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if seq.len() < PO_SEQUENCE_MIN_WIDTH {
            return Err(invalid());
        }
        let sequence: u32 = seq.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(Self {
            repair_order: (*ro).to_string(),
            bucket: (*bucket).to_string(),
            vendor_code: (*code).to_string(),
            sequence,
        })
    }
}

/// Upper-case a segment and strip everything that is not a letter or digit
pub fn normalize_segment(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).map(|c| c.to_ascii_uppercase()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub id: Uuid,
    pub sourcing_request_id: Uuid,
    pub quote_id: Uuid,
    pub line_id: String,
    pub part_number: Option<String>,
    pub oem_part_number: Option<String>,
    pub description: String,
    pub condition: PartCondition,
    pub quantity: u32,
    pub unit_price: f64,
    pub line_total: f64,
    pub lead_time_days: u32,
}

impl PurchaseOrderLine {
    pub fn from_quote(request: &SourcingRequest, quote: &VendorQuote) -> Self {
        Self {
            id: Uuid::now_v7(),
            sourcing_request_id: request.id,
            quote_id: quote.id,
            line_id: request.line_id.clone(),
            part_number: quote.vendor_part_number.clone().or_else(|| request.part_number.clone()),
            oem_part_number: request.oem_part_number.clone(),
            description: request.description.clone(),
            condition: quote.condition,
            quantity: request.quantity,
            unit_price: quote.price,
            line_total: round_money(quote.price * f64::from(request.quantity)),
            lead_time_days: quote.lead_time_days,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalInfo {
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub auto_approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionInfo {
    pub method: Option<ApiType>,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmation_number: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledgement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryMetrics {
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub first_receipt_at: Option<DateTime<Utc>>,
    pub fully_received_at: Option<DateTime<Utc>>,
    pub on_time: Option<bool>,
    pub days_late: Option<i64>,
}

/// What a receipt did to the PO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptEffect {
    pub previous_status: PoStatus,
    pub discrepancy_flagged: bool,
}

/// Vendor-facing order grouping approved lines for one (RO, vendor, month)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub repair_order_id: String,
    pub repair_order_number: String,
    pub vendor_id: String,
    pub vendor_code: String,
    pub bucket: String,
    pub sequence: u32,
    pub status: PoStatus,
    pub lines: Vec<PurchaseOrderLine>,

    // Financials
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub shipping_cost: f64,
    pub total_amount: f64,

    // Receiving
    pub total_quantity: u32,
    pub total_received: u32,
    pub percent_received: f64,
    pub receiving_status: ReceivingStatus,
    pub has_discrepancy: bool,
    pub discrepancy_notes: Option<String>,
    /// Status to fall back to when a dispute raised before any receipt is
    /// reconciled
    pub status_before_dispute: Option<PoStatus>,

    pub approval: ApprovalInfo,
    pub transmission: TransmissionInfo,
    pub delivery: DeliveryMetrics,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// Empty draft PO for `sequence` in the bucket of `now`
    pub fn new(
        request: &SourcingRequest,
        vendor: &VendorConfig,
        sequence: u32,
        tax_rate: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let bucket = PoNumber::bucket_for(now);
        let number =
            PoNumber::new(&request.repair_order_number, &bucket, &vendor.vendor_code, sequence);
        Self {
            id: Uuid::now_v7(),
            po_number: number.to_string(),
            repair_order_id: request.repair_order_id.clone(),
            repair_order_number: request.repair_order_number.clone(),
            vendor_id: vendor.id.clone(),
            vendor_code: number.vendor_code,
            bucket,
            sequence,
            status: PoStatus::Draft,
            lines: Vec::new(),
            subtotal: 0.0,
            tax_rate,
            tax_amount: 0.0,
            shipping_cost: 0.0,
            total_amount: 0.0,
            total_quantity: 0,
            total_received: 0,
            percent_received: 0.0,
            receiving_status: ReceivingStatus::NotStarted,
            has_discrepancy: false,
            discrepancy_notes: None,
            status_before_dispute: None,
            approval: ApprovalInfo::default(),
            transmission: TransmissionInfo::default(),
            delivery: DeliveryMetrics::default(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            version: 0,
            deleted_at: None,
        }
    }

    pub fn add_line(&mut self, line: PurchaseOrderLine, now: DateTime<Utc>) -> Result<()> {
        if !self.status.accepts_lines() {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and no longer accepts lines",
                self.po_number, self.status
            )));
        }
        if self.lines.iter().any(|l| l.sourcing_request_id == line.sourcing_request_id) {
            return Err(PartSourceError::Conflict(format!(
                "sourcing request {} is already on purchase order {}",
                line.sourcing_request_id, self.po_number
            )));
        }
        self.lines.push(line);
        self.recompute_totals();
        self.updated_at = now;
        Ok(())
    }

    /// Take a sourcing request's line back off the PO
    ///
    /// Only possible while the PO still accepts lines.
    pub fn remove_line(
        &mut self,
        sourcing_request_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrderLine> {
        if !self.status.accepts_lines() {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and its lines are fixed",
                self.po_number, self.status
            )));
        }
        let index = self
            .lines
            .iter()
            .position(|l| l.sourcing_request_id == sourcing_request_id)
            .ok_or_else(|| {
                PartSourceError::NotFound(format!(
                    "sourcing request {sourcing_request_id} on purchase order {}",
                    self.po_number
                ))
            })?;
        let line = self.lines.remove(index);
        self.recompute_totals();
        self.updated_at = now;
        Ok(line)
    }

    /// Recompute line totals, financial totals, quantity and expected delivery
    pub fn recompute_totals(&mut self) {
        for line in &mut self.lines {
            line.line_total = round_money(line.unit_price * f64::from(line.quantity));
        }
        self.subtotal = round_money(self.lines.iter().map(|l| l.line_total).sum());
        self.tax_amount = round_money(self.subtotal * self.tax_rate);
        self.total_amount = round_money(self.subtotal + self.tax_amount + self.shipping_cost);
        self.total_quantity = self.lines.iter().map(|l| l.quantity).sum();
        self.delivery.expected_delivery_date = self
            .lines
            .iter()
            .map(|l| l.lead_time_days)
            .max()
            .map(|days| self.created_at + Duration::days(i64::from(days)));
        self.recompute_receiving();
    }

    fn recompute_receiving(&mut self) {
        self.percent_received = if self.total_quantity == 0 {
            0.0
        } else {
            (f64::from(self.total_received) / f64::from(self.total_quantity) * 100.0).max(0.0)
        };
        self.receiving_status = ReceivingStatus::from_percent(self.percent_received);
    }

    pub fn transition(&mut self, next: PoStatus, now: DateTime<Utc>) -> Result<PoStatus> {
        let previous = self.status;
        if !previous.can_transition_to(next) {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} cannot move from {previous} to {next}",
                self.po_number
            )));
        }
        if next == PoStatus::Disputed {
            self.status_before_dispute = Some(previous);
        }
        match next {
            PoStatus::PendingApproval => self.approval.submitted_at = Some(now),
            PoStatus::Closed => self.closed_at = Some(now),
            PoStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(previous)
    }

    /// Apply a receipt of `quantity` units
    ///
    /// Over-receipt or an explicit discrepancy flags the PO and moves it to
    /// `disputed`; otherwise the status follows the receiving status.
    pub fn apply_receipt(
        &mut self,
        quantity: u32,
        discrepancy: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReceiptEffect> {
        if !self.status.accepts_receipts() {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} is {} and cannot receive goods",
                self.po_number, self.status
            )));
        }
        if quantity == 0 {
            return Err(PartSourceError::InvalidInput("received quantity must be positive".into()));
        }

        let previous_status = self.status;
        self.total_received = self.total_received.saturating_add(quantity);
        self.recompute_receiving();
        self.delivery.first_receipt_at.get_or_insert(now);
        self.updated_at = now;

        let over = self.receiving_status == ReceivingStatus::OverReceived;
        let discrepancy_flagged = over || discrepancy.is_some();
        if discrepancy_flagged {
            let note = match discrepancy {
                Some(note) => note.to_string(),
                None => format!(
                    "received {} of {} ordered units",
                    self.total_received, self.total_quantity
                ),
            };
            self.discrepancy_notes = Some(match self.discrepancy_notes.take() {
                Some(existing) => format!("{existing}; {note}"),
                None => note,
            });
            self.has_discrepancy = true;
            if self.status != PoStatus::Disputed {
                self.transition(PoStatus::Disputed, now)?;
            }
        } else if self.status != PoStatus::Disputed {
            self.follow_receiving_status(now)?;
        }

        let complete = matches!(
            self.receiving_status,
            ReceivingStatus::Complete | ReceivingStatus::OverReceived
        );
        if complete && self.delivery.fully_received_at.is_none() {
            self.record_completion(now);
        }
        Ok(ReceiptEffect { previous_status, discrepancy_flagged })
    }

    fn follow_receiving_status(&mut self, now: DateTime<Utc>) -> Result<()> {
        let target = match self.receiving_status {
            ReceivingStatus::NotStarted => return Ok(()),
            ReceivingStatus::Partial => PoStatus::PartialReceived,
            ReceivingStatus::Complete | ReceivingStatus::OverReceived => PoStatus::FullyReceived,
        };
        if self.status != target {
            self.transition(target, now)?;
        }
        Ok(())
    }

    fn record_completion(&mut self, now: DateTime<Utc>) {
        self.delivery.fully_received_at = Some(now);
        if let Some(expected) = self.delivery.expected_delivery_date {
            let late_days = (now - expected).num_days();
            self.delivery.on_time = Some(now <= expected);
            self.delivery.days_late = Some(late_days.max(0));
        }
    }

    /// Clear an open discrepancy and restore the status the receipts imply
    pub fn reconcile(&mut self, resolution: &str, now: DateTime<Utc>) -> Result<PoStatus> {
        if !self.has_discrepancy && self.status != PoStatus::Disputed {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} has no open discrepancy",
                self.po_number
            )));
        }
        let target = match self.receiving_status {
            ReceivingStatus::NotStarted => self.status_before_dispute.unwrap_or(PoStatus::Sent),
            ReceivingStatus::Partial => PoStatus::PartialReceived,
            ReceivingStatus::Complete | ReceivingStatus::OverReceived => PoStatus::FullyReceived,
        };
        self.has_discrepancy = false;
        self.discrepancy_notes = Some(match self.discrepancy_notes.take() {
            Some(existing) => format!("{existing}; resolved: {resolution}"),
            None => format!("resolved: {resolution}"),
        });
        let previous = self.transition(target, now)?;
        self.status_before_dispute = None;
        Ok(previous)
    }

    /// Close a fully received PO with no open discrepancy
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<PoStatus> {
        if self.has_discrepancy {
            return Err(PartSourceError::InvalidTransition(format!(
                "purchase order {} has an open discrepancy and must be reconciled first",
                self.po_number
            )));
        }
        self.transition(PoStatus::Closed, now)
    }

    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<PoStatus> {
        let previous = self.transition(PoStatus::Cancelled, now)?;
        self.cancellation_reason = Some(reason.to_string());
        Ok(previous)
    }

    pub fn number(&self) -> Result<PoNumber> {
        self.po_number.parse()
    }
}
