//! SQLite record store
//!
//! Durable backing of the cross-batch cache. One row per `(scope, key)`;
//! requests also carry their `reason` so call trees can be walked downward.

use super::pragma::apply_optimized_pragmas;
use crate::collecting::{RecordStore, Scope, StoreError};
use crate::record::{Record, RecordId};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS raw_records (
    scope TEXT NOT NULL,
    id TEXT NOT NULL,
    reason TEXT,
    body TEXT NOT NULL,
    PRIMARY KEY (scope, id)
);
CREATE INDEX IF NOT EXISTS idx_raw_records_reason ON raw_records(scope, reason);
";

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn set(&self, scope: Scope, key: RecordId, record: &Record) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        let reason = record.reason().map(|reason| reason.to_string());

        self.conn().execute(
            "INSERT INTO raw_records (scope, id, reason, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, id) DO UPDATE SET reason = excluded.reason, body = excluded.body",
            params![scope.as_str(), key.to_string(), reason, body],
        )?;
        Ok(())
    }

    async fn get(&self, scope: Scope, key: RecordId) -> Result<Option<Record>, StoreError> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM raw_records WHERE scope = ?1 AND id = ?2",
                params![scope.as_str(), key.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn called_requests(&self, reason: RecordId) -> Result<Vec<Record>, StoreError> {
        let bodies: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT body FROM raw_records WHERE scope = ?1 AND reason = ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![Scope::Request.as_str(), reason.to_string()], |row| {
                row.get(0)
            })?;
            let bodies = rows.collect::<Result<Vec<String>, _>>()?;
            bodies
        };

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}
