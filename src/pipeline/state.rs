//! Pipeline cursor
//!
//! Tracks the last persisted pulse, the next pulse worth fetching and the
//! latest pulse known to heavy storage. The cursor only moves forward and
//! only after a pulse has been persisted.

use crate::model::Beauty;
use crate::record::{Pulse, PulseNumber};
use crate::storage::{StorageError, StorageWriter};

/// Totals since startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub pulses: u64,
    pub records: u64,
    pub entities: u64,
    pub fetch_failures: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub last: Pulse,
    pub should_iterate_from: PulseNumber,
    pub current_heavy_pn: PulseNumber,
    pub stats: Stats,
}

impl State {
    /// Start after `last`, or just before genesis on a fresh database
    pub fn new(last: Option<Pulse>) -> Self {
        let last = last.unwrap_or_else(|| Pulse::new(PulseNumber(PulseNumber::GENESIS.0 - 1)));
        Self {
            should_iterate_from: last.number.next(),
            current_heavy_pn: last.number,
            last,
            stats: Stats::default(),
        }
    }

    pub async fn restore(storage: &dyn StorageWriter) -> Result<Self, StorageError> {
        let last = storage.last_pulse().await?;
        match &last {
            Some(pulse) => log::info!("📍 Resuming after pulse {}", pulse.number),
            None => log::info!("📍 Empty database, starting from genesis"),
        }
        Ok(Self::new(last))
    }

    /// Pulse number to ask the pulse source for
    pub fn next_pulse(&self) -> PulseNumber {
        self.last.number.next().max(self.should_iterate_from)
    }

    /// Heavy storage has finalized pulses we have not processed
    pub fn is_behind(&self) -> bool {
        self.current_heavy_pn > self.last.number
    }

    pub fn observe_heavy(&mut self, current: PulseNumber) {
        self.current_heavy_pn = self.current_heavy_pn.max(current);
    }

    /// Record a persisted pulse; older pulses never move the cursor back
    pub fn advance(&mut self, pulse: &Pulse, should_iterate_from: PulseNumber, records: usize, beauty: &Beauty) {
        if pulse.number > self.last.number {
            self.last = pulse.clone();
        }
        self.should_iterate_from = self.should_iterate_from.max(should_iterate_from);
        self.stats.pulses += 1;
        self.stats.records += records as u64;
        self.stats.entities += beauty.entity_count() as u64;
    }
}
