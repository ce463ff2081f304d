//! Background schedulers
//!
//! Schedulers own their spawned task: `start` spawns it with a fresh
//! cancellation token and `stop` cancels it and awaits the join handle.

pub mod error;
pub mod health_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use health_scheduler::{HealthCheckScheduler, HealthCheckSchedulerConfig};
