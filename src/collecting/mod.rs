//! Record correlation primitives
//!
//! - [`chain`]: pair one parent with one child sharing an origin
//! - [`bound`]: two-level in-batch call bounds
//! - [`tree`]: full call trees rebuilt through the cross-batch cache
//! - [`cache`]: LRU over the durable record store
//! - [`genesis`]: bootstrap pulse snapshot

pub mod bound;
pub mod cache;
pub mod chain;
pub mod genesis;
pub mod tree;

pub use bound::{Bound, BoundCollector};
pub use cache::{RecordCache, RecordStore, Scope, StoreError};
pub use chain::{Chain, ChainCollector, CoupledResult, CoupledSideEffect, Item, RelationDesc};
pub use genesis::{GenesisMember, GenesisSnapshot};
pub use tree::{Structure, TreeBuilder};

use crate::record::RecordId;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The ledger and the record store disagree; processing cannot continue
    #[error("missing {scope} {id} while building call tree")]
    MissingPrerequisite { scope: Scope, id: RecordId },

    #[error("transaction {0} registered twice in one pulse")]
    DuplicateTransaction(String),

    #[error("transaction {0} finished twice in one pulse")]
    DuplicateTransactionResult(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
