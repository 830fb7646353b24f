//! Domain collectors
//!
//! Each collector turns records of one pulse into domain entities. Most
//! look at a single record; the rest correlate through the chain collectors
//! or rebuild call trees through the record cache.
//!
//! ## Per-pulse flow
//!
//! ```text
//! batch (ascending record number)
//!   ├─ every record → RecordCache
//!   ├─ genesis pulse only → GenesisSnapshot → collect_genesis
//!   └─ every record
//!        ├─ every collector → collect
//!        └─ result of an API call → ApiResult → collect_call
//! ```

pub mod balance;
pub mod deposit;
pub mod member;
pub mod migration;
pub mod transaction;

pub use balance::{BalanceCollector, BurnedBalanceCollector, BurnedBalanceUpdateCollector};
pub use deposit::{DepositCollector, DepositUpdateCollector};
pub use member::MemberCollector;
pub use migration::{MigrationAddressCollector, WastedAddressCollector};
pub use transaction::{TxRegisterCollector, TxResultCollector};

use crate::collecting::{CollectError, GenesisSnapshot, RecordCache, TreeBuilder};
use crate::model::Beauty;
use crate::record::{CallParams, Pulse, Record, Request, ResultRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a public API call with its request and decoded parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult {
    pub result: ResultRecord,
    pub request: Request,
    pub params: CallParams,
}

impl ApiResult {
    /// `None` unless `record` is a result answering an API call. The
    /// answered request must already be known to the cache.
    pub async fn resolve(builder: &TreeBuilder, record: &Record) -> Result<Option<Self>, CollectError> {
        let Some(result) = ResultRecord::from_record(record) else {
            return Ok(None);
        };
        let request = builder.fetch_request(result.request()).await?;
        let Some(params) = request.call_params() else {
            return Ok(None);
        };
        Ok(Some(Self {
            result,
            request,
            params,
        }))
    }

    pub fn call_site(&self) -> &str {
        &self.params.call_site
    }
}

#[async_trait]
pub trait Collector: Send {
    type Output: Send;

    /// Entities produced by one record; relevance is checked before parsing
    async fn collect(&mut self, _record: &Record) -> Result<Vec<Self::Output>, CollectError> {
        Ok(Vec::new())
    }

    /// Entities produced by the result of an API call
    async fn collect_call(&mut self, _call: &ApiResult) -> Result<Vec<Self::Output>, CollectError> {
        Ok(Vec::new())
    }

    /// Entities present at genesis
    fn collect_genesis(&mut self, _snapshot: &GenesisSnapshot) -> Vec<Self::Output> {
        Vec::new()
    }
}

/// Every collector, run in a fixed order over one pulse
pub struct Collectors {
    cache: Arc<RecordCache>,
    builder: TreeBuilder,
    members: MemberCollector,
    balances: BalanceCollector,
    deposits: DepositCollector,
    deposit_updates: DepositUpdateCollector,
    burned_balances: BurnedBalanceCollector,
    burned_balance_updates: BurnedBalanceUpdateCollector,
    migration_addresses: MigrationAddressCollector,
    wasted_addresses: WastedAddressCollector,
    tx_registers: TxRegisterCollector,
    tx_results: TxResultCollector,
}

impl Collectors {
    /// `chain_capacity` bounds every chain collector's parent cache
    pub fn new(cache: Arc<RecordCache>, chain_capacity: usize) -> Self {
        let builder = TreeBuilder::new(cache.clone());
        Self {
            members: MemberCollector::new(builder.clone()),
            balances: BalanceCollector,
            deposits: DepositCollector::new(builder.clone()),
            deposit_updates: DepositUpdateCollector,
            burned_balances: BurnedBalanceCollector,
            burned_balance_updates: BurnedBalanceUpdateCollector,
            migration_addresses: MigrationAddressCollector::new(chain_capacity),
            wasted_addresses: WastedAddressCollector::new(chain_capacity),
            tx_registers: TxRegisterCollector,
            tx_results: TxResultCollector,
            builder,
            cache,
        }
    }

    pub async fn collect(&mut self, pulse: &Pulse, records: &BTreeMap<u32, Record>) -> Result<Beauty, CollectError> {
        let mut beauty = Beauty::new(pulse.clone());

        for record in records.values() {
            self.cache.remember(record).await?;
        }

        if pulse.number.is_genesis() {
            let snapshot = GenesisSnapshot::build(pulse.number, records.values());
            for member in self.members.collect_genesis(&snapshot) {
                beauty.add_member(member);
            }
            for deposit in self.deposits.collect_genesis(&snapshot) {
                beauty.add_deposit(deposit);
            }
            for address in self.migration_addresses.collect_genesis(&snapshot) {
                beauty.add_migration_address(address);
            }
        }

        for record in records.values() {
            self.collect_record(record, &mut beauty).await?;
        }

        log::debug!(
            "Collected {} entities from {} records of pulse {}",
            beauty.entity_count(),
            records.len(),
            pulse.number
        );
        Ok(beauty)
    }

    async fn collect_record(&mut self, record: &Record, beauty: &mut Beauty) -> Result<(), CollectError> {
        for update in self.balances.collect(record).await? {
            beauty.balances.insert(update.id, update);
        }
        for update in self.deposit_updates.collect(record).await? {
            beauty.deposit_updates.insert(update.id, update);
        }
        for burned in self.burned_balances.collect(record).await? {
            beauty.burned_balances.insert(burned.account_state, burned);
        }
        for update in self.burned_balance_updates.collect(record).await? {
            beauty.burned_balance_updates.insert(update.id, update);
        }
        for address in self.migration_addresses.collect(record).await? {
            beauty.add_migration_address(address);
        }
        for address in self.wasted_addresses.collect(record).await? {
            beauty.add_wasted_address(address);
        }
        for tx in self.tx_registers.collect(record).await? {
            beauty.add_tx_register(tx)?;
        }

        let Some(call) = ApiResult::resolve(&self.builder, record).await? else {
            return Ok(());
        };
        for member in self.members.collect_call(&call).await? {
            beauty.add_member(member);
        }
        for deposit in self.deposits.collect_call(&call).await? {
            beauty.add_deposit(deposit);
        }
        for tx in self.tx_results.collect_call(&call).await? {
            beauty.add_tx_result(tx)?;
        }
        Ok(())
    }
}
