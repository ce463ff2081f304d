//! SQLite implementations of the core persistence ports

pub mod audit_repository;
pub mod manager;
pub mod purchase_order_repository;
pub mod sourcing_repository;
pub mod vendor_repository;

pub use audit_repository::SqliteAuditLedger;
pub use manager::{DbConnection, DbManager};
pub use purchase_order_repository::SqlitePurchaseOrderRepository;
pub use sourcing_repository::SqliteSourcingRequestRepository;
pub use vendor_repository::SqliteVendorRepository;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use partsource_domain::{PartSourceError, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task;
use uuid::Uuid;

use crate::errors::InfraError;

// =============================================================================
// Column helpers shared by the repositories
// =============================================================================

/// Fixed-width RFC 3339 so text order equals time order
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_opt(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

pub(crate) fn parse_ts(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

pub(crate) fn parse_ts_opt(
    raw: Option<String>,
    column: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_ts(&value, column)).transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|err| PartSourceError::from(InfraError::from(err)))
}

/// Decode a JSON text column inside a row mapper
pub(crate) fn json_column<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: DeserializeOwned,
{
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

/// Parse a `Display`/`FromStr` enum stored as text
pub(crate) fn enum_column<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            format!("unrecognised value '{raw}': {err}").into(),
        )
    })
}

pub(crate) fn uuid_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

/// Write transaction holding the write lock from its first statement
pub(crate) fn begin_immediate(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(manager::map_sql_error)
}

/// Run blocking SQLite work on a pooled connection off the async runtime
pub(crate) async fn with_connection<T, F>(db: &Arc<DbManager>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || -> Result<T> {
        let mut conn = db.get_connection()?;
        work(&mut *conn)
    })
    .await
    .map_err(map_join_error)?
}

pub(crate) fn map_join_error(err: task::JoinError) -> PartSourceError {
    if err.is_cancelled() {
        PartSourceError::Internal("blocking task cancelled".into())
    } else {
        PartSourceError::Internal(format!("blocking task failed: {err}"))
    }
}
