//! # PartSource Domain
//!
//! Business domain types and models for the parts sourcing engine.
//!
//! This crate contains:
//! - Sourcing requests, vendor quotes, vendor configuration
//! - Purchase orders, PO numbering and receiving events
//! - Typed quote rules, engine events and audit entries
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other PartSource crates
//! - No I/O; derived fields are computed by explicit methods

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
