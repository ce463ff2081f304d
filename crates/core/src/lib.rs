//! # PartSource Core
//!
//! Business logic for the parts sourcing engine - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for persistence, vendor transports, the audit
//!   ledger and the event stream
//! - Vendor rate limiting, circuit breaking, health probing and quote caching
//! - Quote collection, evaluation and the sourcing request lifecycle
//! - Purchase order generation, transmission and receiving
//!
//! ## Architecture Principles
//! - Only depends on `partsource-common` and `partsource-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod audit;
mod locks;
pub mod procurement;
pub mod sourcing;
pub mod vendor;

pub use audit::{AuditLedger, Auditor, EventPublisher, NoopEventPublisher};
pub use procurement::{PurchaseOrderGenerator, PurchaseOrderRepository, ReceivingReconciler};
pub use sourcing::{
    Decision, Evaluation, QuoteCollection, QuoteEvaluator, SourcingOrchestrator, SourcingOutcome,
    SourcingRequestRepository, SourcingService, VendorCallOutcome,
};
pub use vendor::{
    bootstrap_vendors, install_vendor, AdapterError, AdapterFactory, OrderConfirmation,
    OrderRequest, QuoteCache, VendorAdapter, VendorAdapterRegistry, VendorHealthMonitor,
    VendorRateLimiter, VendorRepository,
};
