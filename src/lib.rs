//! # Observer
//!
//! Reconstructs ledger state (members, balances, deposits, migration
//! addresses, transactions) from the raw record stream of heavy storage and
//! keeps a relational projection of it in SQLite.
//!
//! Data flow: `sources` → `collecting` / `collectors` → `filtering` →
//! `storage`, driven pulse by pulse by `pipeline`.

pub mod collecting;
pub mod collectors;
pub mod filtering;
pub mod fixtures;
pub mod model;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod storage;
