//! Pulse pipeline
//!
//! ```text
//! PulseSource::fetch(next)
//!     ↓
//! RecordSource::fetch(pulse)        (retried)
//!     ↓
//! Collectors::collect → filter
//!     ↓
//! StorageWriter::store              (retried)
//!     ↓
//! State::advance → sleep
//! ```
//!
//! One pulse at a time. A pulse that cannot be fetched is asked for again
//! after `attempt_interval`; records that cannot be fetched or a pulse that
//! cannot be stored stop the pipeline with an error.

use super::config::ObserverConfig;
use super::retry::{RetryError, RetryPolicy};
use super::state::State;
use crate::collecting::{CollectError, RecordCache};
use crate::collectors::Collectors;
use crate::filtering;
use crate::record::PulseNumber;
use crate::sources::{PulseSource, RecordSource, SourceError};
use crate::storage::{StorageError, StorageWriter};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("collect failed: {0}")]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Fetch(RetryError<SourceError>),

    #[error(transparent)]
    Persist(RetryError<StorageError>),

    #[error("cannot restore cursor: {0}")]
    Restore(StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No pulse was available, or the pulse source failed
    FetchFailed,
    Processed { pulse: PulseNumber, behind: bool },
}

pub struct Observer<P, R, W> {
    config: ObserverConfig,
    pulses: P,
    records: R,
    storage: W,
    collectors: Collectors,
    retry: RetryPolicy,
    state: State,
}

impl<P, R, W> Observer<P, R, W>
where
    P: PulseSource,
    R: RecordSource,
    W: StorageWriter,
{
    /// Build the pipeline and resume after the last persisted pulse
    pub async fn new(
        config: ObserverConfig,
        pulses: P,
        records: R,
        storage: W,
        cache: Arc<RecordCache>,
    ) -> Result<Self, PipelineError> {
        let state = State::restore(&storage).await.map_err(PipelineError::Restore)?;
        Ok(Self {
            collectors: Collectors::new(cache, config.chain_cache_size),
            retry: RetryPolicy::new(config.attempts, config.attempt_interval),
            config,
            pulses,
            records,
            storage,
            state,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Process the next pulse, if heavy storage has one
    pub async fn step(&mut self) -> Result<StepOutcome, PipelineError> {
        let from = self.state.next_pulse();
        let pulse = match self.pulses.fetch(from).await {
            Ok(Some(pulse)) => pulse,
            Ok(None) => {
                debug!("No finalized pulse at or after {} yet", from);
                self.state.stats.fetch_failures += 1;
                return Ok(StepOutcome::FetchFailed);
            }
            Err(e) => {
                warn!("⚠️  Pulse fetch from {} failed: {}", from, e);
                self.state.stats.fetch_failures += 1;
                return Ok(StepOutcome::FetchFailed);
            }
        };
        let number = pulse.number;

        let records = &self.records;
        let batch = self
            .retry
            .run(&format!("records fetch for pulse {}", number), || records.fetch(number))
            .await
            .map_err(PipelineError::Fetch)?;

        match self.pulses.fetch_current().await {
            Ok(current) => self.state.observe_heavy(current),
            Err(e) => warn!(
                "⚠️  Current pulse lookup failed, keeping {}: {}",
                self.state.current_heavy_pn, e
            ),
        }

        let beauty = self.collectors.collect(&pulse, &batch.records).await?;
        let beauty = filtering::filter(beauty);

        let storage = &self.storage;
        self.retry
            .run(&format!("persist of pulse {}", number), || storage.store(&pulse, &beauty))
            .await
            .map_err(PipelineError::Persist)?;

        self.state
            .advance(&pulse, batch.should_iterate_from, batch.records.len(), &beauty);

        info!(
            "📦 Pulse {} ({}) | records: {} | members: {} | deposits: {} | txs: {} | heavy: {}",
            number,
            number.as_datetime().format("%Y-%m-%d %H:%M:%S"),
            batch.records.len(),
            beauty.members.len(),
            beauty.deposits.len(),
            beauty.tx_registers.len(),
            self.state.current_heavy_pn
        );

        Ok(StepOutcome::Processed {
            pulse: number,
            behind: self.state.is_behind(),
        })
    }

    /// How long to wait before the next step
    pub fn pause(&self, outcome: StepOutcome, elapsed: Duration) -> Duration {
        match outcome {
            StepOutcome::FetchFailed => self.config.attempt_interval,
            StepOutcome::Processed { behind: true, .. } => self.config.fast_forward_interval,
            StepOutcome::Processed { behind: false, .. } => self.config.interval.saturating_sub(elapsed),
        }
    }

    /// Run until `stop` turns true or its sender is dropped
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<(), PipelineError> {
        info!("🚀 Observer started at pulse {}", self.state.next_pulse());

        while !*stop.borrow() {
            let started = Instant::now();
            let outcome = self.step().await?;
            let pause = self.pause(outcome, started.elapsed());

            tokio::select! {
                _ = sleep(pause) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            "🛑 Observer stopped after pulse {} ({} pulses, {} records this run)",
            self.state.last.number, self.state.stats.pulses, self.state.stats.records
        );
        Ok(())
    }
}
