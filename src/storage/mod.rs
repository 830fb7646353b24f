//! Durable state
//!
//! - [`SqliteStorage`]: relational projection written once per pulse
//! - [`SqliteRecordStore`]: raw records behind the cross-batch cache

mod pragma;
pub mod records;
pub mod sqlite;

pub use records::SqliteRecordStore;
pub use sqlite::SqliteStorage;

use crate::model::Beauty;
use crate::record::Pulse;
use async_trait::async_trait;
use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend temporarily unreachable
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("result for unregistered transaction {0}")]
    UnregisteredTransaction(String),
}

impl StorageError {
    /// Busy/locked databases and unreachable backends are retried
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            StorageError::Unavailable(_) => true,
            _ => false,
        }
    }
}

#[async_trait]
pub trait StorageWriter: Send + Sync {
    /// Last pulse persisted, `None` on a fresh database
    async fn last_pulse(&self) -> Result<Option<Pulse>, StorageError>;

    /// Persist one filtered pulse atomically; re-storing a pulse is harmless
    async fn store(&self, pulse: &Pulse, beauty: &Beauty) -> Result<(), StorageError>;
}
