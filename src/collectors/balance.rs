//! Account and burned-balance state changes
//!
//! These read single side effects; no correlation is needed.

use super::Collector;
use crate::collecting::CollectError;
use crate::model::{BalanceUpdate, BurnedBalance, BurnedBalanceUpdate};
use crate::record::payload::{AccountState, BurnedBalanceState};
use crate::record::{prototype, Record, RecordId, SideEffect};
use async_trait::async_trait;

/// Amend of `image`, with its superseded state
fn amend_of(record: &Record, image: RecordId) -> Option<(SideEffect, RecordId)> {
    if !record.is_amend() || record.image() != Some(image) {
        return None;
    }
    let effect = SideEffect::from_record(record)?;
    let prev_state = effect.prev_state?;
    Some((effect, prev_state))
}

#[derive(Default)]
pub struct BalanceCollector;

#[async_trait]
impl Collector for BalanceCollector {
    type Output = BalanceUpdate;

    async fn collect(&mut self, record: &Record) -> Result<Vec<BalanceUpdate>, CollectError> {
        let Some((amend, prev_state)) = amend_of(record, prototype::ACCOUNT) else {
            return Ok(Vec::new());
        };
        let state: AccountState = amend.state("account");
        Ok(vec![BalanceUpdate {
            id: amend.id,
            prev_state,
            balance: state.balance,
        }])
    }
}

#[derive(Default)]
pub struct BurnedBalanceCollector;

#[async_trait]
impl Collector for BurnedBalanceCollector {
    type Output = BurnedBalance;

    async fn collect(&mut self, record: &Record) -> Result<Vec<BurnedBalance>, CollectError> {
        if !record.is_activate() || record.image() != Some(prototype::BURNED_BALANCE) {
            return Ok(Vec::new());
        }
        let Some(activate) = SideEffect::from_record(record) else {
            return Ok(Vec::new());
        };
        let state: BurnedBalanceState = activate.state("burned balance");
        Ok(vec![BurnedBalance {
            account_state: activate.id,
            balance: state.balance,
        }])
    }
}

#[derive(Default)]
pub struct BurnedBalanceUpdateCollector;

#[async_trait]
impl Collector for BurnedBalanceUpdateCollector {
    type Output = BurnedBalanceUpdate;

    async fn collect(&mut self, record: &Record) -> Result<Vec<BurnedBalanceUpdate>, CollectError> {
        let Some((amend, prev_state)) = amend_of(record, prototype::BURNED_BALANCE) else {
            return Ok(Vec::new());
        };
        let state: BurnedBalanceState = amend.state("burned balance");
        Ok(vec![BurnedBalanceUpdate {
            id: amend.id,
            prev_state,
            balance: state.balance,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, id};
    use serde_json::json;

    #[tokio::test]
    async fn test_account_amend_becomes_balance_update() {
        let mut collector = BalanceCollector;
        let amend = fixtures::amend(id(5), id(1), id(4), prototype::ACCOUNT, id(2), json!({"balance": "70"}));

        let updates = collector.collect(&amend).await.unwrap();
        assert_eq!(
            updates,
            vec![BalanceUpdate {
                id: id(5),
                prev_state: id(2),
                balance: "70".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_other_prototypes_are_ignored() {
        let mut collector = BalanceCollector;
        let amend = fixtures::amend(id(5), id(1), id(4), prototype::DEPOSIT, id(2), json!({"balance": "70"}));
        assert!(collector.collect(&amend).await.unwrap().is_empty());

        let activate = fixtures::activate(id(6), id(6), id(4), prototype::ACCOUNT, json!({"balance": "1"}));
        assert!(collector.collect(&activate).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_memory_degrades_to_empty_balance() {
        let mut collector = BalanceCollector;
        let mut amend = fixtures::amend(id(5), id(1), id(4), prototype::ACCOUNT, id(2), json!({}));
        if let crate::record::Virtual::Amend(body) = &mut amend.body {
            body.memory = b"not json".to_vec();
        }
        let updates = collector.collect(&amend).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].balance, "");
    }

    #[tokio::test]
    async fn test_burned_balance_lifecycle() {
        let mut created = BurnedBalanceCollector;
        let mut updated = BurnedBalanceUpdateCollector;
        let activate = fixtures::activate(id(2), id(2), id(1), prototype::BURNED_BALANCE, json!({"balance": "0"}));
        let amend = fixtures::amend(id(4), id(2), id(3), prototype::BURNED_BALANCE, id(2), json!({"balance": "15"}));

        assert_eq!(created.collect(&activate).await.unwrap()[0].account_state, id(2));
        assert!(created.collect(&amend).await.unwrap().is_empty());

        let updates = updated.collect(&amend).await.unwrap();
        assert_eq!(updates[0].prev_state, id(2));
        assert_eq!(updates[0].balance, "15");
    }
}
