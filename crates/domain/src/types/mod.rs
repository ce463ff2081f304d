//! Domain types and models

pub mod audit;
pub mod events;
pub mod line_item;
pub mod purchase_order;
pub mod quote;
pub mod receiving;
pub mod rules;
pub mod sourcing;
pub mod vendor;

pub use audit::{AuditAction, AuditEntry, EntityType};
pub use events::EngineEvent;
pub use line_item::{LineItem, SourcingConstraints, VehicleContext};
pub use purchase_order::{
    normalize_segment, ApprovalInfo, DeliveryMetrics, PoNumber, PoStatus, PurchaseOrder,
    PurchaseOrderLine, ReceiptEffect, ReceivingStatus, TransmissionInfo,
};
pub use quote::{BrandType, PartCondition, QuoteCriteria, RawQuote, VendorQuote};
pub use receiving::{DiscrepancyKind, ReceiptInput, ReceivingEvent};
pub use rules::{EvaluationPolicy, QuoteRule, RankingKey};
pub use sourcing::{AutomationType, SourcingConfig, SourcingRequest, SourcingStatus};
pub use vendor::{
    ApiType, CachingPolicy, CallOutcome, CallPolicy, ConnectionStatus, RateLimitSettings,
    VendorAuth, VendorCapabilities, VendorConfig, VendorEndpoints, VendorStats,
};
