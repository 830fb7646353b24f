//! SQLite projection
//!
//! Tables written (one transaction per pulse):
//! - `pulses` - INSERT OR IGNORE, the highest row is the resume point;
//!   `observed_at` is when the pulse was first persisted
//! - `members`, `deposits`, `burned_balances` - UPSERT on reference, residual
//!   updates as `UPDATE ... WHERE state = prev_state`
//! - `migration_addresses` - INSERT OR IGNORE, wasted addresses UPSERT
//! - `transactions` - registers INSERT OR IGNORE, results UPDATE
//!
//! Every statement is idempotent, so replaying a pulse after a crash
//! between commit and cursor update changes nothing.

use super::pragma::apply_optimized_pragmas;
use super::{StorageError, StorageWriter};
use crate::model::Beauty;
use crate::record::{Node, Pulse, PulseNumber};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pulses (
    pulse_number INTEGER PRIMARY KEY,
    entropy BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    nodes TEXT NOT NULL,
    observed_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS members (
    member_ref TEXT PRIMARY KEY,
    wallet_ref TEXT,
    account_ref TEXT,
    account_state TEXT NOT NULL,
    balance TEXT NOT NULL,
    migration_address TEXT,
    public_key TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_members_account_state ON members(account_state);
CREATE TABLE IF NOT EXISTS deposits (
    deposit_ref TEXT PRIMARY KEY,
    member_ref TEXT,
    eth_hash TEXT NOT NULL,
    deposit_state TEXT NOT NULL,
    amount TEXT NOT NULL,
    balance TEXT NOT NULL,
    hold_release_date INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    lockup INTEGER NOT NULL,
    vesting INTEGER NOT NULL,
    vesting_step INTEGER NOT NULL,
    is_confirmed INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deposits_state ON deposits(deposit_state);
CREATE TABLE IF NOT EXISTS burned_balances (
    account_state TEXT PRIMARY KEY,
    balance TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS migration_addresses (
    address TEXT PRIMARY KEY,
    pulse_number INTEGER NOT NULL,
    wasted INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS transactions (
    tx_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    member_from TEXT,
    member_to TEXT,
    deposit TEXT,
    amount TEXT NOT NULL,
    pulse_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    fee TEXT,
    finish_pulse_number INTEGER
);
";

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite projection ready at {}", db_path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(tx: &Transaction<'_>, pulse: &Pulse, beauty: &Beauty) -> Result<(), StorageError> {
        tx.execute(
            "INSERT OR IGNORE INTO pulses (pulse_number, entropy, timestamp, nodes, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pulse.number.0,
                pulse.entropy,
                pulse.timestamp,
                serde_json::to_string(&pulse.nodes)?,
                Utc::now().timestamp()
            ],
        )?;

        for member in beauty.members.values() {
            tx.execute(
                "INSERT INTO members
                 (member_ref, wallet_ref, account_ref, account_state, balance,
                  migration_address, public_key, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(member_ref) DO UPDATE SET
                    wallet_ref = excluded.wallet_ref,
                    account_ref = excluded.account_ref,
                    account_state = excluded.account_state,
                    balance = excluded.balance,
                    migration_address = COALESCE(excluded.migration_address, members.migration_address),
                    public_key = excluded.public_key,
                    status = excluded.status",
                params![
                    member.member_ref.to_string(),
                    member.wallet_ref.map(|r| r.to_string()),
                    member.account_ref.map(|r| r.to_string()),
                    member.account_state.to_string(),
                    member.balance,
                    member.migration_address,
                    member.public_key,
                    member.status.as_str(),
                    member.created_at,
                ],
            )?;
        }

        for update in beauty.balances.values() {
            let changed = tx.execute(
                "UPDATE members SET balance = ?1, account_state = ?2 WHERE account_state = ?3",
                params![update.balance, update.id.to_string(), update.prev_state.to_string()],
            )?;
            if changed == 0 {
                log::warn!(
                    "⚠️  Balance update {} found no member at state {}",
                    update.id,
                    update.prev_state
                );
            }
        }

        for deposit in beauty.deposits.values() {
            tx.execute(
                "INSERT INTO deposits
                 (deposit_ref, member_ref, eth_hash, deposit_state, amount, balance,
                  hold_release_date, timestamp, lockup, vesting, vesting_step, is_confirmed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(deposit_ref) DO UPDATE SET
                    member_ref = COALESCE(excluded.member_ref, deposits.member_ref),
                    eth_hash = excluded.eth_hash,
                    deposit_state = excluded.deposit_state,
                    amount = excluded.amount,
                    balance = excluded.balance,
                    hold_release_date = excluded.hold_release_date,
                    timestamp = excluded.timestamp,
                    lockup = excluded.lockup,
                    vesting = excluded.vesting,
                    vesting_step = excluded.vesting_step,
                    is_confirmed = excluded.is_confirmed",
                params![
                    deposit.deposit_ref.to_string(),
                    deposit.member_ref.map(|r| r.to_string()),
                    deposit.eth_hash,
                    deposit.deposit_state.to_string(),
                    deposit.amount,
                    deposit.balance,
                    deposit.hold_release_date,
                    deposit.timestamp,
                    deposit.lockup,
                    deposit.vesting,
                    deposit.vesting_step,
                    deposit.is_confirmed,
                ],
            )?;
        }

        for update in beauty.deposit_updates.values() {
            let changed = tx.execute(
                "UPDATE deposits SET
                    amount = ?1,
                    balance = ?2,
                    hold_release_date = ?3,
                    lockup = ?4,
                    is_confirmed = ?5,
                    eth_hash = CASE WHEN ?6 = '' THEN eth_hash ELSE ?6 END,
                    timestamp = CASE WHEN ?3 > ?4 THEN ?3 - ?4 ELSE timestamp END,
                    deposit_state = ?7
                 WHERE deposit_state = ?8",
                params![
                    update.amount,
                    update.balance,
                    update.hold_release_date,
                    update.lockup,
                    update.is_confirmed,
                    update.tx_hash,
                    update.id.to_string(),
                    update.prev_state.to_string(),
                ],
            )?;
            if changed == 0 {
                log::warn!(
                    "⚠️  Deposit update {} found no deposit at state {}",
                    update.id,
                    update.prev_state
                );
            }
        }

        for burned in beauty.burned_balances.values() {
            tx.execute(
                "INSERT INTO burned_balances (account_state, balance) VALUES (?1, ?2)
                 ON CONFLICT(account_state) DO UPDATE SET balance = excluded.balance",
                params![burned.account_state.to_string(), burned.balance],
            )?;
        }

        for update in beauty.burned_balance_updates.values() {
            let changed = tx.execute(
                "UPDATE burned_balances SET balance = ?1, account_state = ?2 WHERE account_state = ?3",
                params![update.balance, update.id.to_string(), update.prev_state.to_string()],
            )?;
            if changed == 0 {
                log::warn!(
                    "⚠️  Burned balance update {} found no balance at state {}",
                    update.id,
                    update.prev_state
                );
            }
        }

        for address in beauty.migration_addresses.values() {
            tx.execute(
                "INSERT OR IGNORE INTO migration_addresses (address, pulse_number, wasted)
                 VALUES (?1, ?2, ?3)",
                params![address.address, address.pulse.0, address.wasted],
            )?;
        }

        for address in beauty.wasted_addresses.values() {
            tx.execute(
                "INSERT INTO migration_addresses (address, pulse_number, wasted)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT(address) DO UPDATE SET wasted = 1",
                params![address.address, address.pulse.0],
            )?;
        }

        for register in beauty.tx_registers.values() {
            tx.execute(
                "INSERT OR IGNORE INTO transactions
                 (tx_id, kind, member_from, member_to, deposit, amount, pulse_number, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'registered')",
                params![
                    register.tx_id,
                    register.kind.as_str(),
                    register.member_from,
                    register.member_to,
                    register.deposit,
                    register.amount,
                    register.pulse.0,
                ],
            )?;
        }

        for result in beauty.tx_results.values() {
            let changed = tx.execute(
                "UPDATE transactions SET status = ?1, fee = ?2, finish_pulse_number = ?3
                 WHERE tx_id = ?4",
                params![result.status.as_str(), result.fee, result.pulse.0, result.tx_id],
            )?;
            if changed == 0 {
                return Err(StorageError::UnregisteredTransaction(result.tx_id.clone()));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StorageWriter for SqliteStorage {
    async fn last_pulse(&self) -> Result<Option<Pulse>, StorageError> {
        let row: Option<(u32, Vec<u8>, i64, String)> = self
            .conn()
            .query_row(
                "SELECT pulse_number, entropy, timestamp, nodes FROM pulses
                 ORDER BY pulse_number DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((number, entropy, timestamp, nodes)) = row else {
            return Ok(None);
        };
        let nodes: Vec<Node> = serde_json::from_str(&nodes)?;
        Ok(Some(Pulse {
            number: PulseNumber(number),
            entropy,
            timestamp,
            nodes,
        }))
    }

    async fn store(&self, pulse: &Pulse, beauty: &Beauty) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::write(&tx, pulse, beauty)?;
        tx.commit()?;

        log::debug!(
            "✅ Stored pulse {} ({} entities)",
            pulse.number,
            beauty.entity_count()
        );
        Ok(())
    }
}
