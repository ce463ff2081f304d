//! Sourcing: quote collection, evaluation and the request lifecycle

pub mod evaluator;
pub mod orchestrator;
pub mod ports;
pub mod service;

pub use evaluator::{Decision, Evaluation, QuoteEvaluator, RejectedQuote};
pub use orchestrator::{
    QuoteCollection, SourcingOrchestrator, VendorCallOutcome, VendorCallReport,
};
pub use ports::SourcingRequestRepository;
pub use service::{SourcingOutcome, SourcingService};
