//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for PartSource
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum PartSourceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A state machine refused the requested transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Optimistic concurrency check or unique constraint failed
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Vendor error: {0}")]
    Vendor(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PartSourceError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} '{id}'"))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type alias for PartSource operations
pub type Result<T> = std::result::Result<T, PartSourceError>;
