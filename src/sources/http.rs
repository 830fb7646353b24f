//! Export service client
//!
//! ## API Reference
//!
//! - `GET {base}/pulses?from=N` → `Pulse`, 404 while nothing at or after
//!   `N` is finalized
//! - `GET {base}/pulses/current` → `{"pulseNumber": N}`
//! - `GET {base}/records?pulse=N` → `{"records": [{"recordNumber", "record"}],
//!   "shouldIterateFrom": N}`

use super::{PulseSource, RecordBatch, RecordSource, SourceError};
use crate::record::{Pulse, PulseNumber, Record};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPulse {
    pub pulse_number: PulseNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberedRecord {
    pub record_number: u32,
    pub record: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    #[serde(default)]
    pub records: Vec<NumberedRecord>,
    #[serde(default)]
    pub should_iterate_from: PulseNumber,
}

impl From<RecordsResponse> for RecordBatch {
    fn from(response: RecordsResponse) -> Self {
        RecordBatch {
            records: response
                .records
                .into_iter()
                .map(|numbered| (numbered.record_number, numbered.record))
                .collect(),
            should_iterate_from: response.should_iterate_from,
        }
    }
}

#[derive(Clone)]
pub struct ExportClient {
    base_url: String,
    client: reqwest::Client,
}

impl ExportClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Unavailable(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }
}

#[async_trait]
impl PulseSource for ExportClient {
    async fn fetch(&self, from: PulseNumber) -> Result<Option<Pulse>, SourceError> {
        let response = self.get("/pulses", &[("from", from.to_string())]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SourceError::Decode(format!("pulse lookup returned {}", response.status())));
        }
        let pulse: Pulse = response.json().await?;
        if pulse.number < from {
            return Err(SourceError::Decode(format!(
                "asked for pulse {} or later, got {}",
                from, pulse.number
            )));
        }
        Ok(Some(pulse))
    }

    async fn fetch_current(&self) -> Result<PulseNumber, SourceError> {
        let response = self.get("/pulses/current", &[]).await?;
        if !response.status().is_success() {
            return Err(SourceError::Decode(format!("current pulse returned {}", response.status())));
        }
        let current: CurrentPulse = response.json().await?;
        Ok(current.pulse_number)
    }
}

#[async_trait]
impl RecordSource for ExportClient {
    async fn fetch(&self, pulse: PulseNumber) -> Result<RecordBatch, SourceError> {
        let response = self.get("/records", &[("pulse", pulse.to_string())]).await?;
        if !response.status().is_success() {
            return Err(SourceError::Decode(format!(
                "records of pulse {} returned {}",
                pulse,
                response.status()
            )));
        }
        let body: RecordsResponse = response.json().await?;
        Ok(body.into())
    }
}
