//! Seams to the world outside the ledger.
//!
//! The fungible token, native-currency balances and custodian introspection
//! all belong to the execution environment. The engine only calls through
//! these traits.

use crate::error::CollaboratorError;
use crate::types::{Address, Balance};

/// A fungible-token ledger holding any number of tokens.
pub trait TokenLedger {
    fn balance_of(&self, token: &Address, holder: &Address) -> Result<Balance, CollaboratorError>;

    /// Move `amount` of `token` from `from` to `spender`, consuming an
    /// allowance `from` granted to `spender` beforehand.
    fn pull(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError>;

    /// Move `amount` of `token` held by `from` to `to`.
    fn push(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError>;
}

/// Native-currency balances.
pub trait NativeLedger {
    fn native_balance(&self, holder: &Address) -> Result<Balance, CollaboratorError>;

    fn push_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError>;
}

/// Capability probe run against a candidate custodian.
pub trait CustodianProbe {
    fn is_contract(&self, address: &Address) -> Result<bool, CollaboratorError>;

    /// Owners reported by a multisig-style contract. `None` when the
    /// contract does not expose owner enumeration at all.
    fn get_owners(&self, address: &Address) -> Result<Option<Vec<Address>>, CollaboratorError>;
}
