//! In-process event bus

pub mod broadcast;

pub use broadcast::BroadcastEventPublisher;
