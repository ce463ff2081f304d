//! # PartSource Infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - SQLite persistence (r2d2 pool) for vendors, sourcing requests, quotes,
//!   purchase orders, receipts and the audit ledger
//! - Vendor transports: REST over `reqwest` and document-drop adapters for
//!   EDI, email, portal and file-export vendors
//! - Configuration loading, `tracing` setup and the event bus
//! - The background vendor health scheduler
//!
//! ## Architecture
//! - Implements traits defined in `partsource-core`
//! - Contains all "impure" code (I/O, network, filesystem)

pub mod config;
pub mod database;
pub mod errors;
pub mod events;
pub mod integrations;
pub mod observability;
pub mod scheduling;

pub use database::{
    DbManager, SqliteAuditLedger, SqlitePurchaseOrderRepository, SqliteSourcingRequestRepository,
    SqliteVendorRepository,
};
pub use errors::InfraError;
pub use events::BroadcastEventPublisher;
pub use integrations::{DefaultAdapterFactory, DocumentDropAdapter, RestVendorAdapter};
pub use observability::init_tracing;
pub use scheduling::{HealthCheckScheduler, HealthCheckSchedulerConfig};
