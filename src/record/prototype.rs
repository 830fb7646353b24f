//! Well-known application prototypes
//!
//! Prototype identifiers are fixed at genesis; collectors compare a request's
//! `prototype` or a side effect's `image` against them before parsing anything.

use super::{PulseNumber, RecordId};

pub const MEMBER: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0001);
pub const WALLET: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0002);
pub const ACCOUNT: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0003);
pub const DEPOSIT: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0004);
pub const BURNED_BALANCE: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0005);
pub const PUBLIC_KEY_SHARD: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0006);
pub const MIGRATION_SHARD: RecordId = RecordId::new(PulseNumber::GENESIS, 0x0100_0007);

pub fn name(prototype: RecordId) -> Option<&'static str> {
    let name = match prototype {
        MEMBER => "member",
        WALLET => "wallet",
        ACCOUNT => "account",
        DEPOSIT => "deposit",
        BURNED_BALANCE => "burned_balance",
        PUBLIC_KEY_SHARD => "public_key_shard",
        MIGRATION_SHARD => "migration_shard",
        _ => return None,
    };
    Some(name)
}
