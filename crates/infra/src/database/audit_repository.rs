//! Append-only audit ledger in SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use partsource_core::audit::AuditLedger;
use partsource_domain::{AuditEntry, EntityType, Result as DomainResult};
use rusqlite::{params, Row};

use super::manager::{map_sql_error, DbManager};
use super::{enum_column, json_column, parse_ts, to_json, ts, uuid_column, with_connection};

/// SQLite implementation of [`AuditLedger`]. Rows are never updated.
pub struct SqliteAuditLedger {
    db: Arc<DbManager>,
}

impl SqliteAuditLedger {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditLedger for SqliteAuditLedger {
    async fn append(&self, entry: AuditEntry) -> DomainResult<()> {
        with_connection(&self.db, move |conn| {
            conn.execute(
                AUDIT_INSERT_SQL,
                params![
                    entry.id.to_string(),
                    entry.entity_type.to_string(),
                    entry.entity_id,
                    entry.action.to_string(),
                    entry.from_status,
                    entry.to_status,
                    to_json(&entry.detail)?,
                    entry.actor,
                    ts(entry.created_at),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn entries_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DomainResult<Vec<AuditEntry>> {
        let entity_id = entity_id.to_string();
        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(AUDIT_SELECT_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![entity_type.to_string(), entity_id], map_entry_row)
                .map_err(map_sql_error)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)
        })
        .await
    }
}

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let created_at: String = row.get(8)?;
    Ok(AuditEntry {
        id: uuid_column(row, 0)?,
        entity_type: enum_column(row, 1)?,
        entity_id: row.get(2)?,
        action: enum_column(row, 3)?,
        from_status: row.get(4)?,
        to_status: row.get(5)?,
        detail: json_column(row, 6)?,
        actor: row.get(7)?,
        created_at: parse_ts(&created_at, 8)?,
    })
}

const AUDIT_INSERT_SQL: &str = "INSERT INTO audit_log (
        id, entity_type, entity_id, action, from_status, to_status, detail, actor, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

// Ids are v7 UUIDs, so they break ties between entries in the same microsecond
const AUDIT_SELECT_SQL: &str = "SELECT
        id, entity_type, entity_id, action, from_status, to_status, detail, actor, created_at
    FROM audit_log
    WHERE entity_type = ?1 AND entity_id = ?2
    ORDER BY created_at, id";
