//! SQLite-backed store for sourcing requests and their quotes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsource_core::sourcing::SourcingRequestRepository;
use partsource_domain::{
    PartSourceError, Result as DomainResult, SourcingRequest, SourcingStatus, VendorQuote,
};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use super::{begin_immediate, json_column, to_json, ts, ts_opt, with_connection};

/// SQLite implementation of [`SourcingRequestRepository`].
pub struct SqliteSourcingRequestRepository {
    db: Arc<DbManager>,
}

impl SqliteSourcingRequestRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_request(conn: &Connection, request: &SourcingRequest) -> DomainResult<()> {
        let id = request.id.to_string();
        let status = request.status.to_string();
        let data = to_json(request)?;
        let created_at = ts(request.created_at);
        let updated_at = ts(request.updated_at);
        let deleted_at = ts_opt(request.deleted_at);
        let params: [&dyn ToSql; 9] = [
            &id,
            &request.idempotency_key,
            &request.repair_order_id,
            &status,
            &request.version,
            &data,
            &created_at,
            &updated_at,
            &deleted_at,
        ];
        conn.execute(REQUEST_INSERT_SQL, params.as_slice()).map_err(map_sql_error)?;
        Ok(())
    }

    fn update_request(conn: &Connection, request: &SourcingRequest) -> DomainResult<i64> {
        let version = request.version + 1;
        let stored = SourcingRequest { version, ..request.clone() };
        let id = request.id.to_string();
        let status = request.status.to_string();
        let data = to_json(&stored)?;
        let updated_at = ts(request.updated_at);
        let params: [&dyn ToSql; 5] = [&id, &status, &data, &updated_at, &request.version];
        let updated = conn.execute(REQUEST_UPDATE_SQL, params.as_slice()).map_err(map_sql_error)?;
        if updated == 1 {
            return Ok(version);
        }

        let current: Option<i64> = conn
            .query_row(
                "SELECT version FROM sourcing_requests WHERE id = ?1 AND deleted_at IS NULL",
                [&id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_error)?;
        match current {
            Some(current) => Err(PartSourceError::Conflict(format!(
                "sourcing request {} is at version {current}, not {}",
                request.id, request.version
            ))),
            None => Err(PartSourceError::not_found("sourcing request", request.id)),
        }
    }

    fn fetch_where(
        conn: &Connection,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> DomainResult<Vec<SourcingRequest>> {
        let sql = format!(
            "SELECT data, version FROM sourcing_requests \
             WHERE deleted_at IS NULL AND {clause} ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt.query_map(params, map_request_row).map_err(map_sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
    }

    fn replace_quotes(
        conn: &mut Connection,
        request_id: Uuid,
        quotes: &[VendorQuote],
    ) -> DomainResult<()> {
        let request_id = request_id.to_string();
        let tx = begin_immediate(conn)?;
        tx.execute("DELETE FROM vendor_quotes WHERE sourcing_request_id = ?1", [&request_id])
            .map_err(map_sql_error)?;
        {
            let mut stmt = tx.prepare(QUOTE_INSERT_SQL).map_err(map_sql_error)?;
            for quote in quotes {
                stmt.execute(params![
                    quote.id.to_string(),
                    request_id,
                    quote.vendor_id,
                    quote.price,
                    quote.lead_time_days,
                    to_json(quote)?,
                    ts(quote.received_at),
                ])
                .map_err(map_sql_error)?;
            }
        }
        tx.commit().map_err(map_sql_error)
    }
}

#[async_trait]
impl SourcingRequestRepository for SqliteSourcingRequestRepository {
    async fn insert(&self, request: &SourcingRequest) -> DomainResult<()> {
        let request = request.clone();
        with_connection(&self.db, move |conn| Self::insert_request(conn, &request)).await
    }

    async fn update(&self, request: &SourcingRequest) -> DomainResult<i64> {
        let request = request.clone();
        with_connection(&self.db, move |conn| Self::update_request(conn, &request)).await
    }

    async fn find(&self, id: Uuid) -> DomainResult<Option<SourcingRequest>> {
        with_connection(&self.db, move |conn| {
            let id = id.to_string();
            Ok(Self::fetch_where(conn, "id = ?1", &[&id as &dyn ToSql])?.into_iter().next())
        })
        .await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> DomainResult<Option<SourcingRequest>> {
        let key = key.to_string();
        with_connection(&self.db, move |conn| {
            let found = Self::fetch_where(conn, "idempotency_key = ?1", &[&key as &dyn ToSql])?;
            Ok(found.into_iter().next())
        })
        .await
    }

    async fn list_by_status(&self, status: SourcingStatus) -> DomainResult<Vec<SourcingRequest>> {
        with_connection(&self.db, move |conn| {
            let status = status.to_string();
            Self::fetch_where(conn, "status = ?1", &[&status as &dyn ToSql])
        })
        .await
    }

    async fn save_quotes(&self, request_id: Uuid, quotes: &[VendorQuote]) -> DomainResult<()> {
        let quotes = quotes.to_vec();
        with_connection(&self.db, move |conn| Self::replace_quotes(conn, request_id, &quotes))
            .await
    }

    async fn quotes_for(&self, request_id: Uuid) -> DomainResult<Vec<VendorQuote>> {
        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT data FROM vendor_quotes WHERE sourcing_request_id = ?1 \
                     ORDER BY received_at, id",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([request_id.to_string()], |row| json_column(row, 0))
                .map_err(map_sql_error)?;
            rows.collect::<Result<Vec<VendorQuote>, _>>().map_err(map_sql_error)
        })
        .await
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        with_connection(&self.db, move |conn| {
            conn.execute(
                "UPDATE sourcing_requests SET deleted_at = ?2 \
                 WHERE id = ?1 AND deleted_at IS NULL",
                [id.to_string(), ts(at)],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }
}

fn map_request_row(row: &Row<'_>) -> rusqlite::Result<SourcingRequest> {
    let mut request: SourcingRequest = json_column(row, 0)?;
    request.version = row.get(1)?;
    Ok(request)
}

const REQUEST_INSERT_SQL: &str = "INSERT INTO sourcing_requests (
        id, idempotency_key, repair_order_id, status, version, data, created_at, updated_at,
        deleted_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const REQUEST_UPDATE_SQL: &str = "UPDATE sourcing_requests SET
        status = ?2, data = ?3, updated_at = ?4, version = version + 1
    WHERE id = ?1 AND version = ?5 AND deleted_at IS NULL";

const QUOTE_INSERT_SQL: &str = "INSERT INTO vendor_quotes (
        id, sourcing_request_id, vendor_id, price, lead_time_days, data, received_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
