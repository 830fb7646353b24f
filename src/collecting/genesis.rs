//! Genesis snapshot
//!
//! The bootstrap pulse creates the initial application state without API
//! calls: shards map public keys to members, members point at wallets,
//! wallets at accounts and deposits. One pass indexes the activation and the
//! latest state of every object. References are followed through latest
//! states; entities are built from activations so that amends within the
//! genesis pulse fold onto them like in any other pulse. Collectors read the
//! walked structure through
//! [`Collector::collect_genesis`](crate::collectors::Collector::collect_genesis).

use crate::record::payload::{MemberState, MigrationShardState, PublicKeyShardState, WalletState};
use crate::record::{prototype, PulseNumber, Record, RecordId, SideEffect};
use std::collections::{BTreeMap, HashMap};

/// Asset whose account balance is projected
pub const NATIVE_ASSET: &str = "XNS";

/// Member reachable from a public-key shard
#[derive(Debug, Clone, PartialEq)]
pub struct GenesisMember {
    pub public_key: String,
    pub member: SideEffect,
    pub wallet: Option<SideEffect>,
    /// Activation of the native-asset account
    pub account: Option<SideEffect>,
    /// eth tx hash -> deposit activation
    pub deposits: Vec<(String, SideEffect)>,
}

#[derive(Debug, Clone, Default)]
pub struct GenesisSnapshot {
    pulse: PulseNumber,
    objects: HashMap<RecordId, SideEffect>,
    activations: HashMap<RecordId, SideEffect>,
    members: Vec<GenesisMember>,
    free_addresses: Vec<String>,
}

impl GenesisSnapshot {
    pub fn build<'a>(pulse: PulseNumber, records: impl IntoIterator<Item = &'a Record>) -> Self {
        // Latest state wins; records arrive in ledger order
        let mut objects: HashMap<RecordId, SideEffect> = HashMap::new();
        let mut activations: HashMap<RecordId, SideEffect> = HashMap::new();
        for effect in records.into_iter().filter_map(SideEffect::from_record) {
            if effect.is_activate() {
                activations.insert(effect.object(), effect.clone());
            }
            if effect.is_activate() || effect.is_amend() {
                objects.insert(effect.object(), effect);
            }
        }

        let mut snapshot = Self {
            pulse,
            objects,
            activations,
            ..Self::default()
        };
        snapshot.members = snapshot.walk_members();
        snapshot.free_addresses = snapshot.walk_free_addresses();

        log::info!(
            "🌱 Genesis snapshot at pulse {}: {} objects, {} members, {} free migration addresses",
            pulse,
            snapshot.objects.len(),
            snapshot.members.len(),
            snapshot.free_addresses.len()
        );
        snapshot
    }

    pub fn pulse(&self) -> PulseNumber {
        self.pulse
    }

    pub fn members(&self) -> &[GenesisMember] {
        &self.members
    }

    pub fn free_addresses(&self) -> &[String] {
        &self.free_addresses
    }

    /// Latest genesis state of an object
    pub fn object(&self, reference: RecordId) -> Option<&SideEffect> {
        self.objects.get(&reference)
    }

    /// State an object was created with in the genesis pulse
    pub fn activation(&self, reference: RecordId) -> Option<&SideEffect> {
        let activation = self.activations.get(&reference);
        if activation.is_none() && self.objects.contains_key(&reference) {
            log::warn!("⚠️  Genesis object {} is amended but never activated", reference);
        }
        activation
    }

    fn of_image(&self, image: RecordId) -> Vec<&SideEffect> {
        let mut effects: Vec<&SideEffect> = self
            .objects
            .values()
            .filter(|effect| effect.image == image)
            .collect();
        effects.sort_by_key(|effect| effect.id);
        effects
    }

    fn walk_members(&self) -> Vec<GenesisMember> {
        // Sorted by public key so repeated runs emit the same order
        let mut keys: BTreeMap<String, RecordId> = BTreeMap::new();
        for shard in self.of_image(prototype::PUBLIC_KEY_SHARD) {
            let state: PublicKeyShardState = shard.state("public key shard");
            keys.extend(state.map);
        }

        let mut members = Vec::with_capacity(keys.len());
        for (public_key, member_ref) in keys {
            let Some(member) = self.object(member_ref) else {
                log::warn!("⚠️  Genesis shard points at unknown member {}", member_ref);
                continue;
            };
            let member_state: MemberState = member.state("member");
            let wallet = member_state.wallet.and_then(|reference| self.object(reference));
            let wallet_state: WalletState = wallet.map(|w| w.state("wallet")).unwrap_or_default();

            let account = wallet_state
                .accounts
                .get(NATIVE_ASSET)
                .and_then(|reference| self.activation(*reference))
                .cloned();

            let mut deposits: Vec<(String, SideEffect)> = wallet_state
                .deposits
                .iter()
                .filter_map(|(hash, reference)| {
                    self.activation(*reference).map(|deposit| (hash.clone(), deposit.clone()))
                })
                .collect();
            deposits.sort_by(|a, b| a.0.cmp(&b.0));

            members.push(GenesisMember {
                public_key,
                member: member.clone(),
                wallet: wallet.cloned(),
                account,
                deposits,
            });
        }
        members
    }

    fn walk_free_addresses(&self) -> Vec<String> {
        self.of_image(prototype::MIGRATION_SHARD)
            .into_iter()
            .flat_map(|shard| shard.state::<MigrationShardState>("migration shard").free_addresses)
            .collect()
    }
}
