//! Domain entities reconstructed from the record graph
//!
//! Stateful entities are keyed by the ID of the record holding their
//! current state. Updates carry the ID they supersede in `prev_state`.

use crate::collecting::CollectError;
use crate::record::{Pulse, PulseNumber, RecordId};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub member_ref: RecordId,
    pub wallet_ref: Option<RecordId>,
    pub account_ref: Option<RecordId>,
    /// Current account state record
    pub account_state: RecordId,
    pub balance: String,
    pub migration_address: Option<String>,
    pub public_key: String,
    pub status: MemberStatus,
    /// unix seconds
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberStatus {
    /// Created through the public API
    Active,
    /// Present at genesis
    Internal,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceUpdate {
    pub id: RecordId,
    pub prev_state: RecordId,
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deposit {
    pub deposit_ref: RecordId,
    pub member_ref: Option<RecordId>,
    pub eth_hash: String,
    /// Current deposit state record
    pub deposit_state: RecordId,
    pub amount: String,
    pub balance: String,
    /// unix seconds, 0 while on hold without a release pulse
    pub hold_release_date: i64,
    /// vesting start, unix seconds
    pub timestamp: i64,
    pub lockup: i64,
    pub vesting: i64,
    pub vesting_step: i64,
    pub is_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositUpdate {
    pub id: RecordId,
    pub prev_state: RecordId,
    pub amount: String,
    pub balance: String,
    pub hold_release_date: i64,
    pub lockup: i64,
    pub tx_hash: String,
    pub is_confirmed: bool,
}

/// Vesting starts `lockup` seconds before the hold is released
pub fn vesting_start(hold_release_date: i64, lockup: i64) -> Option<i64> {
    (hold_release_date > lockup).then(|| hold_release_date - lockup)
}

/// Unix time of the release pulse, 0 when none is set
pub fn hold_release_date(unhold: PulseNumber) -> i64 {
    if unhold.0 == 0 {
        return 0;
    }
    unhold.unix_timestamp()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurnedBalance {
    pub account_state: RecordId,
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurnedBalanceUpdate {
    pub id: RecordId,
    pub prev_state: RecordId,
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationAddress {
    pub address: String,
    pub pulse: PulseNumber,
    pub wasted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WastedAddress {
    pub address: String,
    pub pulse: PulseNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxKind {
    Transfer,
    Release,
    Migration,
}

impl TxKind {
    pub fn from_call_site(call_site: &str) -> Option<Self> {
        match call_site {
            "member.transfer" => Some(TxKind::Transfer),
            "deposit.transfer" => Some(TxKind::Release),
            "deposit.migration" => Some(TxKind::Migration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "transfer",
            TxKind::Release => "release",
            TxKind::Migration => "migration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxRegister {
    /// Request ID of the API call
    pub tx_id: String,
    pub kind: TxKind,
    pub member_from: Option<String>,
    pub member_to: Option<String>,
    pub deposit: Option<String>,
    pub amount: String,
    pub pulse: PulseNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Registered,
    Succeeded,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Registered => "registered",
            TxStatus::Succeeded => "succeeded",
            TxStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxResult {
    pub tx_id: String,
    pub status: TxStatus,
    pub fee: Option<String>,
    pub pulse: PulseNumber,
}

/// Everything collected from one pulse
#[derive(Debug, Clone, PartialEq)]
pub struct Beauty {
    pub pulse: Pulse,
    pub members: HashMap<RecordId, Member>,
    pub balances: HashMap<RecordId, BalanceUpdate>,
    pub deposits: HashMap<RecordId, Deposit>,
    pub deposit_updates: HashMap<RecordId, DepositUpdate>,
    pub burned_balances: HashMap<RecordId, BurnedBalance>,
    pub burned_balance_updates: HashMap<RecordId, BurnedBalanceUpdate>,
    pub migration_addresses: HashMap<String, MigrationAddress>,
    pub wasted_addresses: HashMap<String, WastedAddress>,
    pub tx_registers: HashMap<String, TxRegister>,
    pub tx_results: HashMap<String, TxResult>,
}

impl Beauty {
    pub fn new(pulse: Pulse) -> Self {
        Self {
            pulse,
            members: HashMap::new(),
            balances: HashMap::new(),
            deposits: HashMap::new(),
            deposit_updates: HashMap::new(),
            burned_balances: HashMap::new(),
            burned_balance_updates: HashMap::new(),
            migration_addresses: HashMap::new(),
            wasted_addresses: HashMap::new(),
            tx_registers: HashMap::new(),
            tx_results: HashMap::new(),
        }
    }

    pub fn add_member(&mut self, member: Member) {
        self.members.insert(member.account_state, member);
    }

    pub fn add_deposit(&mut self, deposit: Deposit) {
        self.deposits.insert(deposit.deposit_state, deposit);
    }

    pub fn add_migration_address(&mut self, address: MigrationAddress) {
        self.migration_addresses.insert(address.address.clone(), address);
    }

    pub fn add_wasted_address(&mut self, address: WastedAddress) {
        self.wasted_addresses.insert(address.address.clone(), address);
    }

    /// One register per transaction per pulse
    pub fn add_tx_register(&mut self, tx: TxRegister) -> Result<(), CollectError> {
        if self.tx_registers.contains_key(&tx.tx_id) {
            return Err(CollectError::DuplicateTransaction(tx.tx_id));
        }
        self.tx_registers.insert(tx.tx_id.clone(), tx);
        Ok(())
    }

    pub fn add_tx_result(&mut self, tx: TxResult) -> Result<(), CollectError> {
        if self.tx_results.contains_key(&tx.tx_id) {
            return Err(CollectError::DuplicateTransactionResult(tx.tx_id));
        }
        self.tx_results.insert(tx.tx_id.clone(), tx);
        Ok(())
    }

    pub fn entity_count(&self) -> usize {
        self.members.len()
            + self.balances.len()
            + self.deposits.len()
            + self.deposit_updates.len()
            + self.burned_balances.len()
            + self.burned_balance_updates.len()
            + self.migration_addresses.len()
            + self.wasted_addresses.len()
            + self.tx_registers.len()
            + self.tx_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }
}
