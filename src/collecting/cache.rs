//! Cross-batch record cache
//!
//! Write-through LRU in front of a durable [`RecordStore`]. Collectors reach
//! back into earlier pulses through it when building call trees.
//!
//! Keys:
//! - requests by their own ID
//! - results and side effects by the ID of the request they answer
//!
//! `called_requests` is a range query and always goes to the store.

use crate::record::{Record, RecordId};
use async_trait::async_trait;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Request,
    Result,
    SideEffect,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Request => "request",
            Scope::Result => "result",
            Scope::SideEffect => "side_effect",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable request/result/side-effect storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn set(&self, scope: Scope, key: RecordId, record: &Record) -> Result<(), StoreError>;

    async fn get(&self, scope: Scope, key: RecordId) -> Result<Option<Record>, StoreError>;

    /// Requests whose `reason` is `reason`, in ID order
    async fn called_requests(&self, reason: RecordId) -> Result<Vec<Record>, StoreError>;
}

pub struct RecordCache {
    store: Arc<dyn RecordStore>,
    lru: Mutex<LruCache<(Scope, RecordId), Record>>,
}

impl RecordCache {
    pub fn new(store: Arc<dyn RecordStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            lru: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn set_request(&self, record: &Record) -> Result<(), StoreError> {
        self.set(Scope::Request, record.id, record).await
    }

    pub async fn set_result(&self, record: &Record) -> Result<(), StoreError> {
        self.set(Scope::Result, record.origin(), record).await
    }

    pub async fn set_side_effect(&self, record: &Record) -> Result<(), StoreError> {
        self.set(Scope::SideEffect, record.origin(), record).await
    }

    /// Store a record under the scope its kind belongs to
    pub async fn remember(&self, record: &Record) -> Result<(), StoreError> {
        if record.is_request() {
            self.set_request(record).await
        } else if record.is_result() {
            self.set_result(record).await
        } else {
            self.set_side_effect(record).await
        }
    }

    pub async fn request(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        self.get(Scope::Request, id).await
    }

    pub async fn result(&self, request: RecordId) -> Result<Option<Record>, StoreError> {
        self.get(Scope::Result, request).await
    }

    pub async fn side_effect(&self, request: RecordId) -> Result<Option<Record>, StoreError> {
        self.get(Scope::SideEffect, request).await
    }

    pub async fn called_requests(&self, reason: RecordId) -> Result<Vec<Record>, StoreError> {
        self.store.called_requests(reason).await
    }

    async fn set(&self, scope: Scope, key: RecordId, record: &Record) -> Result<(), StoreError> {
        self.store.set(scope, key, record).await?;
        self.lru_guard().put((scope, key), record.clone());
        Ok(())
    }

    async fn get(&self, scope: Scope, key: RecordId) -> Result<Option<Record>, StoreError> {
        let cached = self.lru_guard().get(&(scope, key)).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let fetched = self.store.get(scope, key).await?;
        if let Some(record) = &fetched {
            self.lru_guard().put((scope, key), record.clone());
        }
        Ok(fetched)
    }

    fn lru_guard(&self) -> MutexGuard<'_, LruCache<(Scope, RecordId), Record>> {
        self.lru.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
