//! Integration tests for the pulse pipeline
//!
//! The export service and the projection are replaced by in-memory mocks so
//! every fetch and store issued by the observer can be inspected.

use async_trait::async_trait;
use observer::collecting::RecordCache;
use observer::fixtures::{self, id_at};
use observer::model::Beauty;
use observer::pipeline::{Observer, ObserverConfig, PipelineError, RetryError, StepOutcome};
use observer::record::{Pulse, PulseNumber, Record};
use observer::sources::{PulseSource, RecordBatch, RecordSource, SourceError};
use observer::storage::{SqliteRecordStore, SqliteStorage, StorageError, StorageWriter};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct LedgerInner {
    batches: BTreeMap<PulseNumber, RecordBatch>,
    current: PulseNumber,
    pulse_fetches: Vec<PulseNumber>,
    record_fetches: Vec<PulseNumber>,
    record_failures: u32,
}

/// Heavy storage holding a fixed set of finalized pulses
#[derive(Clone, Default)]
struct MockLedger(Arc<Mutex<LedgerInner>>);

impl MockLedger {
    fn with_pulse(self, number: u32, records: Vec<Record>, should_iterate_from: u32) -> Self {
        {
            let mut inner = self.0.lock().unwrap();
            let batch = RecordBatch {
                records: records
                    .into_iter()
                    .enumerate()
                    .map(|(n, record)| (n as u32 + 1, record))
                    .collect(),
                should_iterate_from: PulseNumber(should_iterate_from),
            };
            inner.batches.insert(PulseNumber(number), batch);
            inner.current = inner.current.max(PulseNumber(number));
        }
        self
    }

    fn fail_records(&self, times: u32) {
        self.0.lock().unwrap().record_failures = times;
    }

    fn pulse_fetches(&self) -> Vec<PulseNumber> {
        self.0.lock().unwrap().pulse_fetches.clone()
    }

    fn record_fetches(&self) -> Vec<PulseNumber> {
        self.0.lock().unwrap().record_fetches.clone()
    }
}

#[async_trait]
impl PulseSource for MockLedger {
    async fn fetch(&self, from: PulseNumber) -> Result<Option<Pulse>, SourceError> {
        let mut inner = self.0.lock().unwrap();
        inner.pulse_fetches.push(from);
        Ok(inner.batches.range(from..).next().map(|(number, _)| Pulse::new(*number)))
    }

    async fn fetch_current(&self) -> Result<PulseNumber, SourceError> {
        Ok(self.0.lock().unwrap().current)
    }
}

#[async_trait]
impl RecordSource for MockLedger {
    async fn fetch(&self, pulse: PulseNumber) -> Result<RecordBatch, SourceError> {
        let mut inner = self.0.lock().unwrap();
        inner.record_fetches.push(pulse);
        if inner.record_failures > 0 {
            inner.record_failures -= 1;
            return Err(SourceError::Unavailable("503".to_string()));
        }
        Ok(inner.batches.get(&pulse).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct StorageInner {
    last: Option<Pulse>,
    stored: Vec<PulseNumber>,
    attempts: u32,
    failures: VecDeque<StorageError>,
}

/// Projection that records every store and can be told to fail
#[derive(Clone, Default)]
struct MockStorage(Arc<Mutex<StorageInner>>);

impl MockStorage {
    fn resuming_after(number: u32) -> Self {
        let storage = Self::default();
        storage.0.lock().unwrap().last = Some(Pulse::new(PulseNumber(number)));
        storage
    }

    fn fail_with(&self, errors: Vec<StorageError>) {
        self.0.lock().unwrap().failures = errors.into();
    }

    fn stored(&self) -> Vec<PulseNumber> {
        self.0.lock().unwrap().stored.clone()
    }

    fn attempts(&self) -> u32 {
        self.0.lock().unwrap().attempts
    }
}

#[async_trait]
impl StorageWriter for MockStorage {
    async fn last_pulse(&self) -> Result<Option<Pulse>, StorageError> {
        Ok(self.0.lock().unwrap().last.clone())
    }

    async fn store(&self, pulse: &Pulse, _beauty: &Beauty) -> Result<(), StorageError> {
        let mut inner = self.0.lock().unwrap();
        inner.attempts += 1;
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }
        inner.stored.push(pulse.number);
        inner.last = Some(pulse.clone());
        Ok(())
    }
}

fn config() -> ObserverConfig {
    ObserverConfig {
        interval: Duration::from_millis(20),
        fast_forward_interval: Duration::from_millis(2),
        attempt_interval: Duration::from_millis(1),
        attempts: 3,
        chain_cache_size: 128,
        ..ObserverConfig::default()
    }
}

fn cache() -> Arc<RecordCache> {
    Arc::new(RecordCache::new(Arc::new(SqliteRecordStore::in_memory().unwrap()), 128))
}

async fn build_observer<W: StorageWriter>(ledger: &MockLedger, storage: W) -> Observer<MockLedger, MockLedger, W> {
    Observer::new(config(), ledger.clone(), ledger.clone(), storage, cache())
        .await
        .unwrap()
}

fn transfer(pulse: u32) -> Vec<Record> {
    vec![
        fixtures::api_call(id_at(pulse, 1), "member.transfer", json!({"amount": "10"}), Some("m1")),
        fixtures::result(id_at(pulse, 2), id_at(pulse, 1), json!({"fee": "1"})),
    ]
}

#[tokio::test]
async fn test_empty_pulses_are_skipped() {
    // Test: P says nothing lives before P+50, so P+10..P+40 are never fetched
    let ledger = MockLedger::default()
        .with_pulse(70_000, transfer(70_000), 70_050)
        .with_pulse(70_050, transfer(70_050), 0);
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    assert!(matches!(observer.step().await.unwrap(), StepOutcome::Processed { .. }));
    assert_eq!(observer.state().next_pulse(), PulseNumber(70_050));
    assert!(matches!(observer.step().await.unwrap(), StepOutcome::Processed { .. }));

    assert_eq!(ledger.pulse_fetches(), vec![PulseNumber(70_000), PulseNumber(70_050)]);
    assert_eq!(ledger.record_fetches(), vec![PulseNumber(70_000), PulseNumber(70_050)]);
    assert_eq!(storage.stored(), vec![PulseNumber(70_000), PulseNumber(70_050)]);
}

#[tokio::test]
async fn test_no_pulse_yet_is_a_fetch_failure() {
    let ledger = MockLedger::default();
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let outcome = observer.step().await.unwrap();
    assert_eq!(outcome, StepOutcome::FetchFailed);
    assert_eq!(observer.state().stats.fetch_failures, 1);
    assert!(ledger.record_fetches().is_empty());
    assert!(storage.stored().is_empty());
}

#[tokio::test]
async fn test_transient_record_fetch_is_retried() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    ledger.fail_records(2);
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    observer.step().await.unwrap();
    assert_eq!(ledger.record_fetches().len(), 3);
    assert_eq!(storage.stored(), vec![PulseNumber(70_000)]);
}

#[tokio::test]
async fn test_exhausted_record_fetch_stops_pipeline() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    ledger.fail_records(10);
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let err = observer.step().await.unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(RetryError::Exhausted { attempts: 3, .. })));
    assert_eq!(observer.state().last.number, PulseNumber(69_999));
    assert!(storage.stored().is_empty());
}

#[tokio::test]
async fn test_cursor_waits_for_transient_persist_failure() {
    // Test: The cursor only moves once the retried store succeeds
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    let storage = MockStorage::resuming_after(69_999);
    storage.fail_with(vec![StorageError::Unavailable("locked".to_string())]);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    observer.step().await.unwrap();
    assert_eq!(storage.attempts(), 2);
    assert_eq!(observer.state().last.number, PulseNumber(70_000));
    assert_eq!(ledger.record_fetches(), vec![PulseNumber(70_000)]);
}

#[tokio::test]
async fn test_cursor_holds_when_persist_is_exhausted() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 70_050);
    let storage = MockStorage::resuming_after(69_999);
    storage.fail_with(
        (0..3)
            .map(|_| StorageError::Unavailable("locked".to_string()))
            .collect(),
    );
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let err = observer.step().await.unwrap_err();
    assert!(matches!(err, PipelineError::Persist(RetryError::Exhausted { attempts: 3, .. })));
    assert_eq!(observer.state().last.number, PulseNumber(69_999));
    assert_eq!(observer.state().next_pulse(), PulseNumber(70_000));
    assert_eq!(observer.state().stats.pulses, 0);
}

#[tokio::test]
async fn test_permanent_persist_error_is_not_retried() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    let storage = MockStorage::resuming_after(69_999);
    storage.fail_with(vec![StorageError::UnregisteredTransaction("tx".to_string())]);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let err = observer.step().await.unwrap_err();
    assert!(matches!(err, PipelineError::Persist(RetryError::Permanent { .. })));
    assert_eq!(storage.attempts(), 1);
    assert_eq!(observer.state().last.number, PulseNumber(69_999));
}

#[tokio::test]
async fn test_sleep_policy() {
    let ledger = MockLedger::default();
    let observer = build_observer(&ledger, MockStorage::resuming_after(69_999)).await;
    let config = config();

    assert_eq!(
        observer.pause(StepOutcome::FetchFailed, Duration::ZERO),
        config.attempt_interval
    );
    assert_eq!(
        observer.pause(StepOutcome::Processed { pulse: PulseNumber(70_000), behind: true }, Duration::ZERO),
        config.fast_forward_interval
    );
    assert_eq!(
        observer.pause(
            StepOutcome::Processed { pulse: PulseNumber(70_000), behind: false },
            Duration::from_millis(5)
        ),
        Duration::from_millis(15)
    );
    assert_eq!(
        observer.pause(
            StepOutcome::Processed { pulse: PulseNumber(70_000), behind: false },
            Duration::from_secs(1)
        ),
        Duration::ZERO
    );
}

#[tokio::test]
async fn test_behind_heavy_storage_is_reported() {
    let ledger = MockLedger::default()
        .with_pulse(70_000, transfer(70_000), 0)
        .with_pulse(70_001, Vec::new(), 0);
    let mut observer = build_observer(&ledger, MockStorage::resuming_after(69_999)).await;

    let outcome = observer.step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Processed { pulse: PulseNumber(70_000), behind: true });
    let outcome = observer.step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Processed { pulse: PulseNumber(70_001), behind: false });
}

#[tokio::test]
async fn test_run_exits_when_stop_sender_dropped() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let (stop_tx, stop_rx) = watch::channel(false);
    drop(stop_tx);
    observer.run(stop_rx).await.unwrap();

    assert_eq!(storage.stored(), vec![PulseNumber(70_000)]);
}

#[tokio::test]
async fn test_run_does_nothing_once_stopped() {
    let ledger = MockLedger::default().with_pulse(70_000, transfer(70_000), 0);
    let storage = MockStorage::resuming_after(69_999);
    let mut observer = build_observer(&ledger, storage.clone()).await;

    let (_stop_tx, stop_rx) = watch::channel(true);
    observer.run(stop_rx).await.unwrap();
    assert!(ledger.pulse_fetches().is_empty());
}

#[tokio::test]
async fn test_genesis_then_transfer_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("observer.db");
    let storage = SqliteStorage::open(&db_path).unwrap();

    let ledger = MockLedger::default()
        .with_pulse(PulseNumber::GENESIS.0, fixtures::genesis_trace(), 70_000)
        .with_pulse(70_000, transfer(70_000), 0);
    let mut observer = build_observer(&ledger, storage).await;
    assert_eq!(observer.state().next_pulse(), PulseNumber::GENESIS);

    observer.step().await.unwrap();
    observer.step().await.unwrap();

    let conn = Connection::open(&db_path).unwrap();
    let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap() };
    assert_eq!(count("SELECT COUNT(*) FROM pulses"), 2);
    assert_eq!(count("SELECT COUNT(*) FROM members"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM deposits"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM migration_addresses"), 2);

    let status: String = conn
        .query_row(
            "SELECT status FROM transactions WHERE tx_id = ?1",
            [id_at(70_000, 1).to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "succeeded");

    // A restart resumes after the last stored pulse
    let reopened = SqliteStorage::open(&db_path).unwrap();
    let resumed = Observer::new(config(), ledger.clone(), ledger.clone(), reopened, cache())
        .await
        .unwrap();
    assert_eq!(resumed.state().next_pulse(), PulseNumber(70_001));
}
