//! Members created through `member.create` / `member.migrationCreate`

use super::{ApiResult, Collector};
use crate::collecting::{CollectError, GenesisSnapshot, TreeBuilder};
use crate::model::{Member, MemberStatus};
use crate::record::payload::AccountState;
use crate::record::prototype;
use async_trait::async_trait;

const CREATE_CALL_SITES: [&str; 2] = ["member.create", "member.migrationCreate"];

pub struct MemberCollector {
    builder: TreeBuilder,
}

impl MemberCollector {
    pub fn new(builder: TreeBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Collector for MemberCollector {
    type Output = Member;

    async fn collect_call(&mut self, call: &ApiResult) -> Result<Vec<Member>, CollectError> {
        if !CREATE_CALL_SITES.contains(&call.call_site()) || !call.result.is_success() {
            return Ok(Vec::new());
        }
        let (result, request, params) = (&call.result, &call.request, &call.params);

        let tree = self.builder.build(request.id).await?;
        let (Some(member), Some(account)) = (
            tree.activation_of(prototype::MEMBER),
            tree.activation_of(prototype::ACCOUNT),
        ) else {
            log::warn!(
                "⚠️  {} succeeded in {} without member and account activations",
                params.call_site,
                request.id
            );
            return Ok(Vec::new());
        };

        let wallet = tree.activation_of(prototype::WALLET);
        let state: AccountState = account.state("account");
        let migration_address = result.payload().and_then(|p| p.return_str("migrationAddress"));

        Ok(vec![Member {
            member_ref: member.object(),
            wallet_ref: wallet.map(|w| w.object()),
            account_ref: Some(account.object()),
            account_state: account.id,
            balance: state.balance,
            migration_address,
            public_key: params.public_key.clone(),
            status: MemberStatus::Active,
            created_at: request.id.pulse().unix_timestamp(),
        }])
    }

    fn collect_genesis(&mut self, snapshot: &GenesisSnapshot) -> Vec<Member> {
        snapshot
            .members()
            .iter()
            .filter_map(|genesis| {
                let account = genesis.account.as_ref()?;
                let state: AccountState = account.state("account");
                Some(Member {
                    member_ref: genesis.member.object(),
                    wallet_ref: genesis.wallet.as_ref().map(|w| w.object()),
                    account_ref: Some(account.object()),
                    account_state: account.id,
                    balance: state.balance,
                    migration_address: None,
                    public_key: genesis.public_key.clone(),
                    status: MemberStatus::Internal,
                    created_at: snapshot.pulse().unix_timestamp(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collecting::RecordCache;
    use crate::fixtures::{self, id, id_at};
    use crate::record::{PulseNumber, Record};
    use crate::storage::SqliteRecordStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn collect_all(records: &[Record]) -> Vec<Member> {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let cache = Arc::new(RecordCache::new(store, 64));
        for record in records {
            cache.remember(record).await.unwrap();
        }
        let builder = TreeBuilder::new(cache);
        let mut collector = MemberCollector::new(builder.clone());

        let mut members = Vec::new();
        for record in records {
            if let Some(call) = ApiResult::resolve(&builder, record).await.unwrap() {
                members.extend(collector.collect_call(&call).await.unwrap());
            }
        }
        members
    }

    fn member_create_trace(call_site: &str) -> Vec<Record> {
        vec![
            fixtures::api_call(id(1), call_site, json!({}), None),
            fixtures::constructor(id(2), id(1), prototype::MEMBER),
            fixtures::activate(id(3), id(3), id(2), prototype::MEMBER, json!({})),
            fixtures::constructor(id(4), id(1), prototype::WALLET),
            fixtures::activate(id(5), id(5), id(4), prototype::WALLET, json!({})),
            fixtures::constructor(id(6), id(4), prototype::ACCOUNT),
            fixtures::activate(id(7), id(7), id(6), prototype::ACCOUNT, json!({"balance": "0"})),
            fixtures::result(id(8), id(1), json!({"reference": id(3).to_string(), "migrationAddress": "0xmig"})),
        ]
    }

    #[tokio::test]
    async fn test_member_from_create_call() {
        let members = collect_all(&member_create_trace("member.migrationCreate")).await;

        assert_eq!(members.len(), 1);
        let member = &members[0];
        assert_eq!(member.member_ref, id(3));
        assert_eq!(member.wallet_ref, Some(id(5)));
        assert_eq!(member.account_state, id(7));
        assert_eq!(member.balance, "0");
        assert_eq!(member.migration_address.as_deref(), Some("0xmig"));
        assert_eq!(member.status, MemberStatus::Active);
    }

    #[tokio::test]
    async fn test_other_call_sites_yield_nothing() {
        assert!(collect_all(&member_create_trace("member.transfer")).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_yields_nothing() {
        let mut trace = member_create_trace("member.create");
        trace[7] = fixtures::failed_result(id(8), id(1), "key already registered");
        assert!(collect_all(&trace).await.is_empty());
    }

    #[tokio::test]
    async fn test_genesis_members() {
        let records = fixtures::genesis_trace();
        let snapshot = GenesisSnapshot::build(PulseNumber::GENESIS, &records);
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let builder = TreeBuilder::new(Arc::new(RecordCache::new(store, 8)));
        let mut collector = MemberCollector::new(builder);

        let members = collector.collect_genesis(&snapshot);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_ref, id_at(65_537, 10));
        assert_eq!(members[0].account_state, id_at(65_537, 12));
        assert_eq!(members[0].balance, "1000");
        assert_eq!(members[0].status, MemberStatus::Internal);
    }
}
