//! starfleet-state
//!
//! Persistent state of the staking ledger and the engine that mutates it.
//! Each operation validates, performs its single external transfer, then
//! commits all of its writes in one sled transaction.

pub mod db;
pub mod deploy;
pub mod engine;
pub mod query;

pub use db::{StagedWrites, StateDb};
pub use deploy::deploy;
pub use engine::{Environment, SnapshotReport, StakeEngine};
pub use query::LedgerQuery;
