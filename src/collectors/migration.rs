//! Migration address pool: addresses added by the administrator and
//! addresses handed out to newly migrated members

use super::Collector;
use crate::collecting::{
    BoundCollector, ChainCollector, CollectError, GenesisSnapshot, Item, RelationDesc,
};
use crate::model::{MigrationAddress, WastedAddress};
use crate::record::{prototype, Record, Request, ResultRecord};
use async_trait::async_trait;

const ADD_ADDRESSES_CALL_SITE: &str = "migration.addAddresses";
const MIGRATION_CREATE_CALL_SITE: &str = "member.migrationCreate";
const GET_FREE_ADDRESS_METHOD: &str = "GetFreeMigrationAddress";

pub struct MigrationAddressCollector {
    chain: ChainCollector<Request, ResultRecord>,
}

impl MigrationAddressCollector {
    pub fn new(capacity: usize) -> Self {
        let chain = ChainCollector::with_capacity(
            RelationDesc::requests(|request| {
                request.call_site().as_deref() == Some(ADD_ADDRESSES_CALL_SITE)
            }),
            RelationDesc::results().proper(ResultRecord::is_success),
            capacity,
        );
        Self { chain }
    }
}

#[async_trait]
impl Collector for MigrationAddressCollector {
    type Output = MigrationAddress;

    async fn collect(&mut self, record: &Record) -> Result<Vec<MigrationAddress>, CollectError> {
        if !record.is_request() && !record.is_result() {
            return Ok(Vec::new());
        }
        let Some(chain) = self.chain.collect(&Item::Record(record.clone())) else {
            return Ok(Vec::new());
        };

        let params = chain.parent.call_params().unwrap_or_default();
        let addresses = params
            .call_params
            .get("migrationAddresses")
            .and_then(|value| value.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str())
                    .map(|address| MigrationAddress {
                        address: address.to_string(),
                        pulse: chain.child.id.pulse(),
                        wasted: false,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(addresses)
    }

    fn collect_genesis(&mut self, snapshot: &GenesisSnapshot) -> Vec<MigrationAddress> {
        snapshot
            .free_addresses()
            .iter()
            .map(|address| MigrationAddress {
                address: address.clone(),
                pulse: snapshot.pulse(),
                wasted: false,
            })
            .collect()
    }
}

pub struct WastedAddressCollector {
    bound: BoundCollector,
}

impl WastedAddressCollector {
    pub fn new(capacity: usize) -> Self {
        let bound = BoundCollector::new(
            |request| request.call_site().as_deref() == Some(MIGRATION_CREATE_CALL_SITE),
            |request| {
                request.method() == GET_FREE_ADDRESS_METHOD
                    && request.prototype() == Some(prototype::MIGRATION_SHARD)
            },
            capacity,
        );
        Self { bound }
    }
}

#[async_trait]
impl Collector for WastedAddressCollector {
    type Output = WastedAddress;

    async fn collect(&mut self, record: &Record) -> Result<Vec<WastedAddress>, CollectError> {
        let Some(bound) = self.bound.collect(record) else {
            return Ok(Vec::new());
        };
        if !bound.parent.child.is_amend() {
            log::debug!(
                "Address lookup {} did not amend its shard",
                bound.parent.parent.id
            );
            return Ok(Vec::new());
        }

        let result = &bound.child.child;
        let Some(address) = result.payload().and_then(|p| p.return_str("migrationAddress")) else {
            log::warn!("⚠️  Migration member {} returned no address", bound.child.parent.id);
            return Ok(Vec::new());
        };
        Ok(vec![WastedAddress {
            address,
            pulse: result.id.pulse(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, id, id_at};
    use crate::record::PulseNumber;
    use serde_json::json;

    async fn run<C: Collector>(collector: &mut C, records: &[Record]) -> Vec<C::Output> {
        let mut out = Vec::new();
        for record in records {
            out.extend(collector.collect(record).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_added_addresses_after_success() {
        let mut collector = MigrationAddressCollector::new(16);
        let records = vec![
            fixtures::api_call(
                id(1),
                "migration.addAddresses",
                json!({"migrationAddresses": ["0x1", "0x2", 7]}),
                None,
            ),
            fixtures::result(id(2), id(1), json!(null)),
        ];

        let addresses = run(&mut collector, &records).await;
        let names: Vec<&str> = addresses.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(names, vec!["0x1", "0x2"]);
        assert!(addresses.iter().all(|a| !a.wasted && a.pulse == id(2).pulse()));
    }

    #[tokio::test]
    async fn test_rejected_add_yields_nothing() {
        let mut collector = MigrationAddressCollector::new(16);
        let records = vec![
            fixtures::api_call(id(1), "migration.addAddresses", json!({"migrationAddresses": ["0x1"]}), None),
            fixtures::failed_result(id(2), id(1), "only admin may add"),
        ];
        assert!(run(&mut collector, &records).await.is_empty());
    }

    #[tokio::test]
    async fn test_result_in_later_pulse_still_matches() {
        let mut collector = MigrationAddressCollector::new(16);
        let request = fixtures::api_call(id(1), "migration.addAddresses", json!({"migrationAddresses": ["0x9"]}), None);
        assert!(run(&mut collector, &[request]).await.is_empty());

        let late = fixtures::result(id_at(70_005, 1), id(1), json!(null));
        let addresses = run(&mut collector, &[late]).await;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].pulse, PulseNumber(70_005));
    }

    #[tokio::test]
    async fn test_genesis_free_addresses() {
        let records = fixtures::genesis_trace();
        let snapshot = GenesisSnapshot::build(PulseNumber::GENESIS, &records);
        let mut collector = MigrationAddressCollector::new(16);
        let addresses = collector.collect_genesis(&snapshot);
        assert_eq!(addresses.len(), 2);
        assert!(addresses.iter().all(|a| a.pulse == PulseNumber::GENESIS));
    }

    #[tokio::test]
    async fn test_address_handed_out_is_wasted() {
        let mut collector = WastedAddressCollector::new(16);
        let records = vec![
            fixtures::api_call(id(1), "member.migrationCreate", json!({}), None),
            fixtures::outgoing(id(2), id(1), Some(prototype::MIGRATION_SHARD), "GetFreeMigrationAddress"),
            fixtures::amend(
                id(3),
                id_at(65_537, 30),
                id(2),
                prototype::MIGRATION_SHARD,
                id_at(65_537, 30),
                json!({"freeAddresses": ["0xb"]}),
            ),
            fixtures::result(id(4), id(2), json!({"migrationAddress": "0xa"})),
            fixtures::result(id(5), id(1), json!({"reference": "m1", "migrationAddress": "0xa"})),
        ];

        let wasted = run(&mut collector, &records).await;
        assert_eq!(
            wasted,
            vec![WastedAddress {
                address: "0xa".to_string(),
                pulse: id(5).pulse(),
            }]
        );
    }
}
