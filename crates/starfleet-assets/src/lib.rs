//! starfleet-assets
//!
//! Local implementation of the ledger's collaborators: a multi-token
//! ledger with allowances, native-currency balances, and a contract
//! registry that answers the custodian probe. The staking engine never
//! depends on this crate; tests and the operator CLI plug it in.

pub mod store;

pub use store::{AssetStore, ContractInfo};
