//! SQLite-backed purchase order store.
//!
//! `po_number` and `(repair_order_id, vendor_id, bucket, sequence)` are both
//! unique, so two processes allocating the same sequence collide on insert
//! and the loser sees `PartSourceError::Conflict`. Lines are mirrored into
//! `purchase_order_lines`, which also keeps a sourcing request on one PO.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partsource_core::procurement::PurchaseOrderRepository;
use partsource_domain::{
    PartSourceError, PoStatus, PurchaseOrder, ReceivingEvent, Result as DomainResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use super::{
    begin_immediate, bool_to_int, enum_column, json_column, parse_ts, to_json, ts, ts_opt,
    uuid_column, with_connection,
};

/// SQLite implementation of [`PurchaseOrderRepository`].
pub struct SqlitePurchaseOrderRepository {
    db: Arc<DbManager>,
}

impl SqlitePurchaseOrderRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_po(conn: &Connection, po: &PurchaseOrder) -> DomainResult<()> {
        let id = po.id.to_string();
        let sequence = i64::from(po.sequence);
        let status = po.status.to_string();
        let data = to_json(po)?;
        let created_at = ts(po.created_at);
        let updated_at = ts(po.updated_at);
        let deleted_at = ts_opt(po.deleted_at);
        let params: [&dyn ToSql; 13] = [
            &id,
            &po.po_number,
            &po.repair_order_id,
            &po.vendor_id,
            &po.bucket,
            &sequence,
            &status,
            &po.total_amount,
            &po.version,
            &data,
            &created_at,
            &updated_at,
            &deleted_at,
        ];
        conn.execute(PO_INSERT_SQL, params.as_slice()).map_err(map_sql_error)?;
        Self::replace_lines(conn, po)
    }

    /// Optimistic write of the PO row and its lines; returns the new version
    fn write_po(conn: &Connection, po: &PurchaseOrder) -> DomainResult<i64> {
        let version = po.version + 1;
        let stored = PurchaseOrder { version, ..po.clone() };
        let id = po.id.to_string();
        let status = po.status.to_string();
        let data = to_json(&stored)?;
        let updated_at = ts(po.updated_at);
        let params: [&dyn ToSql; 6] =
            [&id, &status, &po.total_amount, &data, &updated_at, &po.version];
        let updated = conn.execute(PO_UPDATE_SQL, params.as_slice()).map_err(map_sql_error)?;
        if updated == 0 {
            let current: Option<i64> = conn
                .query_row(
                    "SELECT version FROM purchase_orders WHERE id = ?1 AND deleted_at IS NULL",
                    [&id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sql_error)?;
            return Err(match current {
                Some(current) => PartSourceError::Conflict(format!(
                    "purchase order {} is at version {current}, not {}",
                    po.po_number, po.version
                )),
                None => PartSourceError::not_found("purchase order", po.id),
            });
        }
        Self::replace_lines(conn, po)?;
        Ok(version)
    }

    fn replace_lines(conn: &Connection, po: &PurchaseOrder) -> DomainResult<()> {
        let id = po.id.to_string();
        conn.execute("DELETE FROM purchase_order_lines WHERE purchase_order_id = ?1", [&id])
            .map_err(map_sql_error)?;
        let mut stmt = conn.prepare(PO_LINE_INSERT_SQL).map_err(map_sql_error)?;
        for (index, line) in po.lines.iter().enumerate() {
            let line_number = i64::try_from(index + 1).unwrap_or(i64::MAX);
            stmt.execute(params![id, line.sourcing_request_id.to_string(), line_number])
                .map_err(map_sql_error)?;
        }
        Ok(())
    }

    fn fetch_where(
        conn: &Connection,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> DomainResult<Vec<PurchaseOrder>> {
        let sql = format!(
            "SELECT data, version FROM purchase_orders \
             WHERE deleted_at IS NULL AND {clause} ORDER BY created_at, po_number"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt.query_map(params, map_po_row).map_err(map_sql_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
    }

    fn fetch_first(
        conn: &Connection,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> DomainResult<Option<PurchaseOrder>> {
        Ok(Self::fetch_where(conn, clause, params)?.into_iter().next())
    }

    fn insert_receipt(conn: &Connection, event: &ReceivingEvent) -> DomainResult<()> {
        let discrepancy = event.discrepancy.map(|kind| kind.to_string());
        conn.execute(
            RECEIPT_INSERT_SQL,
            params![
                event.id.to_string(),
                event.purchase_order_id.to_string(),
                event.quantity_received,
                ts(event.received_at),
                event.received_by,
                bool_to_int(event.has_discrepancy),
                discrepancy,
                event.notes,
                event.percent_after,
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }
}

#[async_trait]
impl PurchaseOrderRepository for SqlitePurchaseOrderRepository {
    async fn insert(&self, po: &PurchaseOrder) -> DomainResult<()> {
        let po = po.clone();
        with_connection(&self.db, move |conn| {
            let tx = begin_immediate(conn)?;
            Self::insert_po(&tx, &po)?;
            tx.commit().map_err(map_sql_error)?;
            debug!(po_number = %po.po_number, "purchase order inserted");
            Ok(())
        })
        .await
    }

    async fn update(&self, po: &PurchaseOrder) -> DomainResult<i64> {
        let po = po.clone();
        with_connection(&self.db, move |conn| {
            let tx = begin_immediate(conn)?;
            let version = Self::write_po(&tx, &po)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(version)
        })
        .await
    }

    async fn find(&self, id: Uuid) -> DomainResult<Option<PurchaseOrder>> {
        with_connection(&self.db, move |conn| {
            let id = id.to_string();
            Self::fetch_first(conn, "id = ?1", &[&id as &dyn ToSql])
        })
        .await
    }

    async fn find_by_number(&self, po_number: &str) -> DomainResult<Option<PurchaseOrder>> {
        let po_number = po_number.to_string();
        with_connection(&self.db, move |conn| {
            Self::fetch_first(conn, "po_number = ?1", &[&po_number as &dyn ToSql])
        })
        .await
    }

    async fn find_open_for_bucket(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> DomainResult<Option<PurchaseOrder>> {
        let keys = [repair_order_id.to_string(), vendor_id.to_string(), bucket.to_string()];
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT data, version FROM purchase_orders \
                 WHERE deleted_at IS NULL AND repair_order_id = ?1 AND vendor_id = ?2 \
                 AND bucket = ?3 AND status IN ({}) ORDER BY sequence LIMIT 1",
                open_status_list()
            );
            conn.query_row(&sql, params![keys[0], keys[1], keys[2]], map_po_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn find_by_sourcing_request(
        &self,
        request_id: Uuid,
    ) -> DomainResult<Option<PurchaseOrder>> {
        with_connection(&self.db, move |conn| {
            let request_id = request_id.to_string();
            Self::fetch_first(
                conn,
                "id IN (SELECT purchase_order_id FROM purchase_order_lines \
                 WHERE sourcing_request_id = ?1)",
                &[&request_id as &dyn ToSql],
            )
        })
        .await
    }

    async fn max_sequence(
        &self,
        repair_order_id: &str,
        vendor_id: &str,
        bucket: &str,
    ) -> DomainResult<Option<u32>> {
        let keys = [repair_order_id.to_string(), vendor_id.to_string(), bucket.to_string()];
        with_connection(&self.db, move |conn| {
            // Cancelled and deleted POs keep their numbers
            let max: Option<u32> = conn
                .query_row(
                    "SELECT MAX(sequence) FROM purchase_orders \
                     WHERE repair_order_id = ?1 AND vendor_id = ?2 AND bucket = ?3",
                    params![keys[0], keys[1], keys[2]],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(max)
        })
        .await
    }

    async fn record_receipt(
        &self,
        po: &PurchaseOrder,
        event: &ReceivingEvent,
    ) -> DomainResult<i64> {
        let po = po.clone();
        let event = event.clone();
        with_connection(&self.db, move |conn| {
            let tx = begin_immediate(conn)?;
            let version = Self::write_po(&tx, &po)?;
            Self::insert_receipt(&tx, &event)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(version)
        })
        .await
    }

    async fn receipts_for(&self, po_id: Uuid) -> DomainResult<Vec<ReceivingEvent>> {
        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(RECEIPT_SELECT_SQL).map_err(map_sql_error)?;
            let rows =
                stmt.query_map([po_id.to_string()], map_receipt_row).map_err(map_sql_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
        })
        .await
    }

    async fn list_by_status(&self, status: PoStatus) -> DomainResult<Vec<PurchaseOrder>> {
        with_connection(&self.db, move |conn| {
            let status = status.to_string();
            Self::fetch_where(conn, "status = ?1", &[&status as &dyn ToSql])
        })
        .await
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        with_connection(&self.db, move |conn| {
            conn.execute(
                "UPDATE purchase_orders SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                [id.to_string(), ts(at)],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }
}

/// Quoted status names that still accept new lines
fn open_status_list() -> String {
    PoStatus::ALL
        .iter()
        .filter(|status| status.accepts_lines())
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_po_row(row: &Row<'_>) -> rusqlite::Result<PurchaseOrder> {
    let mut po: PurchaseOrder = json_column(row, 0)?;
    po.version = row.get(1)?;
    Ok(po)
}

fn map_receipt_row(row: &Row<'_>) -> rusqlite::Result<ReceivingEvent> {
    let received_at: String = row.get(3)?;
    let has_discrepancy: i64 = row.get(5)?;
    let discrepancy: Option<String> = row.get(6)?;
    Ok(ReceivingEvent {
        id: uuid_column(row, 0)?,
        purchase_order_id: uuid_column(row, 1)?,
        quantity_received: row.get(2)?,
        received_at: parse_ts(&received_at, 3)?,
        received_by: row.get(4)?,
        has_discrepancy: has_discrepancy != 0,
        discrepancy: match discrepancy {
            Some(_) => Some(enum_column(row, 6)?),
            None => None,
        },
        notes: row.get(7)?,
        percent_after: row.get(8)?,
    })
}

const PO_INSERT_SQL: &str = "INSERT INTO purchase_orders (
        id, po_number, repair_order_id, vendor_id, bucket, sequence, status, total_amount,
        version, data, created_at, updated_at, deleted_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

const PO_UPDATE_SQL: &str = "UPDATE purchase_orders SET
        status = ?2, total_amount = ?3, data = ?4, updated_at = ?5, version = version + 1
    WHERE id = ?1 AND version = ?6 AND deleted_at IS NULL";

const PO_LINE_INSERT_SQL: &str = "INSERT INTO purchase_order_lines (
        purchase_order_id, sourcing_request_id, line_number
    ) VALUES (?1, ?2, ?3)";

const RECEIPT_INSERT_SQL: &str = "INSERT INTO receiving_events (
        id, purchase_order_id, quantity_received, received_at, received_by, has_discrepancy,
        discrepancy, notes, percent_after
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const RECEIPT_SELECT_SQL: &str = "SELECT
        id, purchase_order_id, quantity_received, received_at, received_by, has_discrepancy,
        discrepancy, notes, percent_after
    FROM receiving_events
    WHERE purchase_order_id = ?1
    ORDER BY received_at, rowid";
