//! Update filters
//!
//! Within one pulse an entity may be created and amended several times.
//! Amendments form a backward-linked list through `prev_state`:
//!
//! ```text
//! entity X ◄── update Y (prev X) ◄── update Z (prev Y)
//! ```
//!
//! 1. Compaction splices intermediate updates out: Z adopts `prev = X`, Y is
//!    dropped.
//! 2. Folding applies a compacted update to an entity created in the same
//!    pulse: X takes Z's fields and is re-keyed under Z.
//!
//! Updates whose `prev_state` is not in the batch stay as residual updates
//! for the storage layer.

use crate::model::{
    vesting_start, BalanceUpdate, Beauty, BurnedBalance, BurnedBalanceUpdate, Deposit,
    DepositUpdate, Member,
};
use crate::record::RecordId;
use std::collections::HashMap;

pub trait StateUpdate {
    fn id(&self) -> RecordId;
    fn prev_state(&self) -> RecordId;
    fn set_prev_state(&mut self, prev_state: RecordId);
}

/// Entity that takes the fields of an update and moves to its state ID
pub trait Updatable<U: StateUpdate> {
    fn apply(&mut self, update: &U);
}

/// Splice chained updates; returns how many were absorbed
pub fn compact<U: StateUpdate>(updates: &mut HashMap<RecordId, U>) -> usize {
    let mut keys: Vec<RecordId> = updates.keys().copied().collect();
    keys.sort();

    let mut absorbed = 0;
    for key in keys {
        let Some(mut update) = updates.remove(&key) else {
            continue;
        };
        while let Some(prev) = updates.remove(&update.prev_state()) {
            update.set_prev_state(prev.prev_state());
            absorbed += 1;
        }
        updates.insert(key, update);
    }
    absorbed
}

/// Apply compacted updates onto entities of the same batch; returns how many
/// were folded
pub fn fold<E, U>(updates: &mut HashMap<RecordId, U>, entities: &mut HashMap<RecordId, E>) -> usize
where
    E: Updatable<U>,
    U: StateUpdate,
{
    let mut keys: Vec<RecordId> = updates.keys().copied().collect();
    keys.sort();

    let mut folded = 0;
    for key in keys {
        let Some(prev_state) = updates.get(&key).map(StateUpdate::prev_state) else {
            continue;
        };
        let Some(mut entity) = entities.remove(&prev_state) else {
            continue;
        };
        if let Some(update) = updates.remove(&key) {
            entity.apply(&update);
            entities.insert(update.id(), entity);
            folded += 1;
        }
    }
    folded
}

/// Compact then fold
pub fn collapse<E, U>(updates: &mut HashMap<RecordId, U>, entities: &mut HashMap<RecordId, E>)
where
    E: Updatable<U>,
    U: StateUpdate,
{
    let absorbed = compact(updates);
    let folded = fold(updates, entities);
    if absorbed > 0 || folded > 0 {
        log::debug!(
            "Collapsed updates: {} spliced, {} folded, {} residual",
            absorbed,
            folded,
            updates.len()
        );
    }
}

/// Run every filter over a collected pulse
pub fn filter(mut beauty: Beauty) -> Beauty {
    collapse(&mut beauty.balances, &mut beauty.members);
    collapse(&mut beauty.deposit_updates, &mut beauty.deposits);
    collapse(&mut beauty.burned_balance_updates, &mut beauty.burned_balances);
    beauty
}

macro_rules! state_update {
    ($($ty:ty),*) => {
        $(
            impl StateUpdate for $ty {
                fn id(&self) -> RecordId {
                    self.id
                }

                fn prev_state(&self) -> RecordId {
                    self.prev_state
                }

                fn set_prev_state(&mut self, prev_state: RecordId) {
                    self.prev_state = prev_state;
                }
            }
        )*
    };
}

state_update!(BalanceUpdate, DepositUpdate, BurnedBalanceUpdate);

impl Updatable<BalanceUpdate> for Member {
    fn apply(&mut self, update: &BalanceUpdate) {
        self.balance = update.balance.clone();
        self.account_state = update.id;
    }
}

impl Updatable<DepositUpdate> for Deposit {
    fn apply(&mut self, update: &DepositUpdate) {
        self.amount = update.amount.clone();
        self.balance = update.balance.clone();
        self.hold_release_date = update.hold_release_date;
        self.lockup = update.lockup;
        self.is_confirmed = update.is_confirmed;
        if !update.tx_hash.is_empty() {
            self.eth_hash = update.tx_hash.clone();
        }
        if let Some(start) = vesting_start(update.hold_release_date, update.lockup) {
            self.timestamp = start;
        }
        self.deposit_state = update.id;
    }
}

impl Updatable<BurnedBalanceUpdate> for BurnedBalance {
    fn apply(&mut self, update: &BurnedBalanceUpdate) {
        self.balance = update.balance.clone();
        self.account_state = update.id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::id;
    use crate::model::MemberStatus;

    fn member(account_state: RecordId, balance: &str) -> Member {
        Member {
            member_ref: id(100),
            wallet_ref: None,
            account_ref: Some(id(101)),
            account_state,
            balance: balance.to_string(),
            migration_address: None,
            public_key: "pk".to_string(),
            status: MemberStatus::Active,
            created_at: 0,
        }
    }

    fn balance(update: RecordId, prev: RecordId, balance: &str) -> BalanceUpdate {
        BalanceUpdate {
            id: update,
            prev_state: prev,
            balance: balance.to_string(),
        }
    }

    fn keyed<T, F: Fn(&T) -> RecordId>(items: Vec<T>, key: F) -> HashMap<RecordId, T> {
        items.into_iter().map(|item| (key(&item), item)).collect()
    }

    #[test]
    fn test_create_and_two_amends_fold_into_one_entity() {
        // Test: X created, Y amends X, Z amends Y, all in one pulse
        let mut members = keyed(vec![member(id(1), "0")], |m| m.account_state);
        let mut updates = keyed(
            vec![balance(id(2), id(1), "10"), balance(id(3), id(2), "25")],
            |u| u.id,
        );

        collapse(&mut updates, &mut members);

        assert!(updates.is_empty());
        assert_eq!(members.len(), 1);
        let folded = &members[&id(3)];
        assert_eq!(folded.account_state, id(3));
        assert_eq!(folded.balance, "25");
    }

    #[test]
    fn test_chain_on_stored_entity_leaves_one_residual() {
        // Test: W was persisted earlier; Y and Z amend it in this pulse
        let w = crate::fixtures::id_at(69_000, 1);
        let mut members: HashMap<RecordId, Member> = HashMap::new();
        let mut updates = keyed(
            vec![balance(id(2), w, "10"), balance(id(3), id(2), "25")],
            |u| u.id,
        );

        collapse(&mut updates, &mut members);

        assert!(members.is_empty());
        assert_eq!(updates.len(), 1);
        let residual = &updates[&id(3)];
        assert_eq!(residual.prev_state, w);
        assert_eq!(residual.balance, "25");
    }

    #[test]
    fn test_long_chain_in_any_insertion_order() {
        let mut members = keyed(vec![member(id(1), "0")], |m| m.account_state);
        let mut updates = keyed(
            vec![
                balance(id(5), id(4), "4"),
                balance(id(3), id(2), "2"),
                balance(id(2), id(1), "1"),
                balance(id(4), id(3), "3"),
            ],
            |u| u.id,
        );

        collapse(&mut updates, &mut members);

        assert!(updates.is_empty());
        assert_eq!(members.keys().copied().collect::<Vec<_>>(), vec![id(5)]);
        assert_eq!(members[&id(5)].balance, "4");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let w = crate::fixtures::id_at(69_000, 1);
        let mut members = keyed(vec![member(id(1), "0")], |m| m.account_state);
        let mut updates = keyed(
            vec![
                balance(id(2), id(1), "10"),
                balance(id(3), id(2), "25"),
                balance(id(7), w, "5"),
            ],
            |u| u.id,
        );

        collapse(&mut updates, &mut members);
        let (members_once, updates_once) = (members.clone(), updates.clone());
        collapse(&mut updates, &mut members);

        assert_eq!(members, members_once);
        assert_eq!(updates, updates_once);
    }

    #[test]
    fn test_every_entity_keyed_by_its_current_state() {
        let mut members = keyed(
            vec![member(id(1), "0"), member(id(10), "0")],
            |m| m.account_state,
        );
        let mut updates = keyed(
            vec![balance(id(2), id(1), "1"), balance(id(11), id(10), "2")],
            |u| u.id,
        );

        collapse(&mut updates, &mut members);
        assert!(members.iter().all(|(key, m)| *key == m.account_state));
        // No update points at a state ID present as an entity key
        assert!(updates.values().all(|u| !members.contains_key(&u.prev_state)));
    }

    #[test]
    fn test_deposit_vesting_timestamp_rule() {
        let mut deposit = Deposit {
            deposit_ref: id(1),
            member_ref: None,
            eth_hash: "0xe".to_string(),
            deposit_state: id(1),
            amount: "100".to_string(),
            balance: "0".to_string(),
            hold_release_date: 0,
            timestamp: 42,
            lockup: 0,
            vesting: 0,
            vesting_step: 0,
            is_confirmed: false,
        };
        let mut update = DepositUpdate {
            id: id(2),
            prev_state: id(1),
            amount: "100".to_string(),
            balance: "100".to_string(),
            hold_release_date: 50,
            lockup: 100,
            tx_hash: String::new(),
            is_confirmed: true,
        };

        // Hold release before lockup: timestamp untouched
        deposit.apply(&update);
        assert_eq!(deposit.timestamp, 42);
        assert_eq!(deposit.eth_hash, "0xe");

        update.hold_release_date = 1_000;
        deposit.apply(&update);
        assert_eq!(deposit.timestamp, 900);
        assert_eq!(deposit.deposit_state, id(2));
        assert!(deposit.is_confirmed);
    }
}
