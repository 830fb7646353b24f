//! Where pulses and records come from
//!
//! The pipeline only sees these two traits; [`http::ExportClient`] implements
//! both against the heavy-storage export service.

pub mod http;

pub use http::ExportClient;

use crate::record::{Pulse, PulseNumber, Record};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("export service unavailable: {0}")]
    Unavailable(String),

    #[error("export service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed export response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Worth retrying after a pause
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Unavailable(_) => true,
            SourceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SourceError::Decode(_) => false,
        }
    }
}

/// Records of one pulse, keyed by record number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: BTreeMap<u32, Record>,
    /// Next pulse worth fetching; empty pulses in between are skipped
    pub should_iterate_from: PulseNumber,
}

#[async_trait]
pub trait PulseSource: Send + Sync {
    /// First finalized pulse numbered `from` or later, `None` when there is
    /// none yet
    async fn fetch(&self, from: PulseNumber) -> Result<Option<Pulse>, SourceError>;

    /// Latest pulse known to heavy storage
    async fn fetch_current(&self) -> Result<PulseNumber, SourceError>;
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, pulse: PulseNumber) -> Result<RecordBatch, SourceError>;
}
