//! Logging setup for the engine binary and tests

pub mod logging;

pub use logging::{init_test_tracing, init_tracing};
