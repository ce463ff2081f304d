//! # PartSource App
//!
//! Application layer - CLI and main entry point.
//!
//! This crate contains:
//! - Command-line arguments and command handlers
//! - Application context (dependency injection)
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod cli;
pub mod commands;
pub mod context;

pub use cli::{Cli, Command};
pub use commands::execute;
pub use context::AppContext;
