//! Deposits created by migration daemons and their later state changes
//!
//! A `deposit.migration` call either creates the deposit (first daemon
//! confirmation: the call tree holds a constructor on the deposit prototype)
//! or only confirms an existing one (later confirmations: the deposit shows
//! up as an amend, picked up by [`DepositUpdateCollector`]).

use super::{ApiResult, Collector};
use crate::collecting::{CollectError, GenesisSnapshot, TreeBuilder};
use crate::model::{hold_release_date, vesting_start, Deposit, DepositUpdate};
use crate::record::payload::DepositState;
use crate::record::{prototype, Record, RecordId, SideEffect};
use async_trait::async_trait;

const MIGRATION_CALL_SITE: &str = "deposit.migration";

fn deposit_from_state(
    activate: &SideEffect,
    member_ref: Option<RecordId>,
    fallback_hash: String,
) -> Deposit {
    let state: DepositState = activate.state("deposit");
    let hold_release_date = hold_release_date(state.pulse_deposit_unhold);
    let eth_hash = if state.tx_hash.is_empty() {
        fallback_hash
    } else {
        state.tx_hash
    };

    Deposit {
        deposit_ref: activate.object(),
        member_ref,
        eth_hash,
        deposit_state: activate.id,
        amount: state.amount,
        balance: state.balance,
        hold_release_date,
        timestamp: vesting_start(hold_release_date, state.lockup).unwrap_or(0),
        lockup: state.lockup,
        vesting: state.vesting,
        vesting_step: state.vesting_step,
        is_confirmed: state.is_confirmed,
    }
}

pub struct DepositCollector {
    builder: TreeBuilder,
}

impl DepositCollector {
    pub fn new(builder: TreeBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Collector for DepositCollector {
    type Output = Deposit;

    async fn collect_call(&mut self, call: &ApiResult) -> Result<Vec<Deposit>, CollectError> {
        if call.call_site() != MIGRATION_CALL_SITE || !call.result.is_success() {
            return Ok(Vec::new());
        }
        let (request, params) = (&call.request, &call.params);

        let tree = self.builder.build(request.id).await?;
        let Some(constructor) = tree.constructor_of(prototype::DEPOSIT) else {
            log::debug!("Migration call {} confirmed an existing deposit", request.id);
            return Ok(Vec::new());
        };
        let Some(activate) = constructor.side_effect.as_ref().filter(|e| e.is_activate()) else {
            log::warn!(
                "⚠️  Deposit constructor {} has no activation",
                constructor.request.id
            );
            return Ok(Vec::new());
        };

        let member_ref = params.param_str("memberReference").parse().ok();
        Ok(vec![deposit_from_state(activate, member_ref, params.param_str("ethTxHash"))])
    }

    fn collect_genesis(&mut self, snapshot: &GenesisSnapshot) -> Vec<Deposit> {
        snapshot
            .members()
            .iter()
            .flat_map(|member| {
                member.deposits.iter().map(move |(hash, activate)| {
                    deposit_from_state(activate, Some(member.member.object()), hash.clone())
                })
            })
            .collect()
    }
}

#[derive(Default)]
pub struct DepositUpdateCollector;

#[async_trait]
impl Collector for DepositUpdateCollector {
    type Output = DepositUpdate;

    async fn collect(&mut self, record: &Record) -> Result<Vec<DepositUpdate>, CollectError> {
        if !record.is_amend() || record.image() != Some(prototype::DEPOSIT) {
            return Ok(Vec::new());
        }
        let Some(amend) = SideEffect::from_record(record) else {
            return Ok(Vec::new());
        };
        let Some(prev_state) = amend.prev_state else {
            return Ok(Vec::new());
        };

        let state: DepositState = amend.state("deposit");
        Ok(vec![DepositUpdate {
            id: amend.id,
            prev_state,
            amount: state.amount,
            balance: state.balance,
            hold_release_date: hold_release_date(state.pulse_deposit_unhold),
            lockup: state.lockup,
            tx_hash: state.tx_hash,
            is_confirmed: state.is_confirmed,
        }])
    }
}
