//! SQLite-backed vendor store.
//!
//! Static configuration lives in the `config` JSON column; the runtime
//! counters have their own columns so `record_outcome` can bump them in a
//! single `UPDATE` without reading the row first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsource_core::vendor::VendorRepository;
use partsource_domain::{
    CallOutcome, ConnectionStatus, PartSourceError, Result as DomainResult, VendorConfig,
    VendorStats,
};
use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use super::manager::{map_sql_error, DbManager};
use super::{
    bool_to_int, enum_column, json_column, parse_ts_opt, to_json, ts, ts_opt, with_connection,
};

/// SQLite implementation of [`VendorRepository`].
pub struct SqliteVendorRepository {
    db: Arc<DbManager>,
}

impl SqliteVendorRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn upsert_vendor(conn: &Connection, vendor: &VendorConfig, config: &str) -> DomainResult<()> {
        let now = ts(Utc::now());
        let api_type = vendor.api_type.to_string();
        let rank = i64::from(vendor.preference_rank);
        let active = bool_to_int(vendor.active);
        let deleted_at = ts_opt(vendor.deleted_at);
        let status = vendor.connection_status.to_string();
        let params: [&dyn ToSql; 11] = [
            &vendor.id,
            &vendor.name,
            &vendor.vendor_code,
            &api_type,
            &rank,
            &active,
            &config,
            &status,
            &now,
            &now,
            &deleted_at,
        ];
        conn.execute(VENDOR_UPSERT_SQL, params.as_slice()).map_err(map_sql_error)?;
        Ok(())
    }

    fn fetch_one(conn: &Connection, id: &str) -> DomainResult<Option<VendorConfig>> {
        let sql = format!("{VENDOR_SELECT_SQL} WHERE id = ?1 AND deleted_at IS NULL");
        conn.query_row(&sql, [id], map_vendor_row).optional().map_err(map_sql_error)
    }

    fn fetch_all(conn: &Connection) -> DomainResult<Vec<VendorConfig>> {
        let sql =
            format!("{VENDOR_SELECT_SQL} WHERE deleted_at IS NULL ORDER BY preference_rank, id");
        let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt.query_map([], map_vendor_row).map_err(map_sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl VendorRepository for SqliteVendorRepository {
    async fn upsert(&self, vendor: &VendorConfig) -> DomainResult<()> {
        let config = to_json(vendor)?;
        let vendor = vendor.clone();
        with_connection(&self.db, move |conn| Self::upsert_vendor(conn, &vendor, &config)).await
    }

    async fn find(&self, id: &str) -> DomainResult<Option<VendorConfig>> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| Self::fetch_one(conn, &id)).await
    }

    async fn list(&self) -> DomainResult<Vec<VendorConfig>> {
        with_connection(&self.db, |conn| Self::fetch_all(conn)).await
    }

    async fn record_outcome(
        &self,
        vendor_id: &str,
        outcome: &CallOutcome,
        consecutive_failures: u32,
        connection_status: Option<ConnectionStatus>,
    ) -> DomainResult<()> {
        let vendor_id = vendor_id.to_string();
        let outcome = outcome.clone();
        with_connection(&self.db, move |conn| {
            let success = bool_to_int(outcome.success);
            let failure = 1 - success;
            let at = ts(outcome.at);
            // Saturates at i64::MAX, far beyond any realistic latency
            let response_ms = i64::try_from(outcome.response_ms).unwrap_or(i64::MAX);
            let failures = i64::from(consecutive_failures);
            let status = connection_status.map(|s| s.to_string());
            let params: [&dyn ToSql; 8] = [
                &vendor_id,
                &success,
                &failure,
                &at,
                &outcome.error,
                &response_ms,
                &failures,
                &status,
            ];
            let updated =
                conn.execute(VENDOR_RECORD_OUTCOME_SQL, params.as_slice()).map_err(map_sql_error)?;
            if updated == 0 {
                return Err(PartSourceError::not_found("vendor", &vendor_id));
            }
            Ok(())
        })
        .await
    }

    async fn set_connection_status(
        &self,
        vendor_id: &str,
        status: ConnectionStatus,
        consecutive_failures: u32,
    ) -> DomainResult<()> {
        let vendor_id = vendor_id.to_string();
        with_connection(&self.db, move |conn| {
            let status = status.to_string();
            let failures = i64::from(consecutive_failures);
            let now = ts(Utc::now());
            let params: [&dyn ToSql; 4] = [&vendor_id, &status, &failures, &now];
            let updated =
                conn.execute(VENDOR_SET_STATUS_SQL, params.as_slice()).map_err(map_sql_error)?;
            if updated == 0 {
                return Err(PartSourceError::not_found("vendor", &vendor_id));
            }
            Ok(())
        })
        .await
    }

    async fn soft_delete(&self, vendor_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let vendor_id = vendor_id.to_string();
        with_connection(&self.db, move |conn| {
            let at = ts(at);
            conn.execute(
                "UPDATE vendors SET deleted_at = ?2, updated_at = ?2 \
                 WHERE id = ?1 AND deleted_at IS NULL",
                [&vendor_id, &at],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }
}

fn map_vendor_row(row: &Row<'_>) -> rusqlite::Result<VendorConfig> {
    let mut vendor: VendorConfig = json_column(row, 0)?;
    vendor.connection_status = enum_column(row, 1)?;
    vendor.consecutive_failures = row.get(2)?;
    vendor.stats = VendorStats {
        total_requests: row.get::<_, i64>(3)?.unsigned_abs(),
        successful_requests: row.get::<_, i64>(4)?.unsigned_abs(),
        failed_requests: row.get::<_, i64>(5)?.unsigned_abs(),
        last_success_at: parse_ts_opt(row.get(6)?, 6)?,
        last_failure_at: parse_ts_opt(row.get(7)?, 7)?,
        last_error: row.get(8)?,
        average_response_ms: row.get(9)?,
    };
    vendor.deleted_at = parse_ts_opt(row.get(10)?, 10)?;
    Ok(vendor)
}

const VENDOR_SELECT_SQL: &str = "SELECT
        config, connection_status, consecutive_failures, total_requests, successful_requests,
        failed_requests, last_success_at, last_failure_at, last_error, average_response_ms,
        deleted_at
    FROM vendors";

// Counters and connection status are left alone on conflict
const VENDOR_UPSERT_SQL: &str = "INSERT INTO vendors (
        id, name, vendor_code, api_type, preference_rank, active, config, connection_status,
        created_at, updated_at, deleted_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        vendor_code = excluded.vendor_code,
        api_type = excluded.api_type,
        preference_rank = excluded.preference_rank,
        active = excluded.active,
        config = excluded.config,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at";

// Right-hand sides see the pre-update row, so the running average uses the
// old request count
const VENDOR_RECORD_OUTCOME_SQL: &str = "UPDATE vendors SET
        total_requests = total_requests + 1,
        successful_requests = successful_requests + ?2,
        failed_requests = failed_requests + ?3,
        last_success_at = CASE WHEN ?2 = 1 THEN ?4 ELSE last_success_at END,
        last_failure_at = CASE WHEN ?3 = 1 THEN ?4 ELSE last_failure_at END,
        last_error = CASE WHEN ?3 = 1 THEN ?5 ELSE last_error END,
        average_response_ms =
            (average_response_ms * total_requests + ?6) / (total_requests + 1),
        consecutive_failures = ?7,
        connection_status = COALESCE(?8, connection_status),
        updated_at = ?4
    WHERE id = ?1 AND deleted_at IS NULL";

const VENDOR_SET_STATUS_SQL: &str = "UPDATE vendors SET
        connection_status = ?2, consecutive_failures = ?3, updated_at = ?4
    WHERE id = ?1 AND deleted_at IS NULL";
