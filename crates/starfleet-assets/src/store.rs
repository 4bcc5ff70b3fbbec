use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use std::path::Path;
use tracing::{debug, info};

use starfleet_core::collaborator::{CustodianProbe, NativeLedger, TokenLedger};
use starfleet_core::error::CollaboratorError;
use starfleet_core::types::{Address, Balance};

/// What the registry knows about a deployed contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// `None` when the contract has no owner enumeration.
    pub owners: Option<Vec<Address>>,
}

/// Local, sled-backed stand-in for the execution environment's asset layer.
///
/// Named trees:
///   assets/token_balances   — token ‖ holder          → u128 BE
///   assets/allowances       — token ‖ owner ‖ spender → u128 BE
///   assets/native_balances  — holder                  → u128 BE
///   assets/contracts        — address                 → bincode(ContractInfo)
pub struct AssetStore {
    _db: sled::Db,
    balances: sled::Tree,
    allowances: sled::Tree,
    native: sled::Tree,
    contracts: sled::Tree,
}

fn storage(e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Storage(e.to_string())
}

fn tx_err(e: TransactionError<CollaboratorError>) -> CollaboratorError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => storage(e),
    }
}

fn balance_key(token: &Address, holder: &Address) -> Vec<u8> {
    let mut k = Vec::with_capacity(40);
    k.extend_from_slice(token.as_bytes());
    k.extend_from_slice(holder.as_bytes());
    k
}

fn allowance_key(token: &Address, owner: &Address, spender: &Address) -> Vec<u8> {
    let mut k = balance_key(token, owner);
    k.extend_from_slice(spender.as_bytes());
    k
}

fn decode_u128(bytes: Option<&[u8]>) -> Result<u128, CollaboratorError> {
    match bytes {
        None => Ok(0),
        Some(b) => {
            let arr: [u8; 16] = b
                .try_into()
                .map_err(|_| storage(format!("corrupt amount ({} bytes)", b.len())))?;
            Ok(u128::from_be_bytes(arr))
        }
    }
}

/// Debit `from` and credit `to` inside a running transaction.
fn move_within(
    tree: &TransactionalTree,
    from: &[u8],
    to: &[u8],
    amount: Balance,
) -> ConflictableTransactionResult<(), CollaboratorError> {
    let have = decode_u128(tree.get(from)?.as_deref()).map_err(ConflictableTransactionError::Abort)?;
    if have < amount {
        return Err(ConflictableTransactionError::Abort(
            CollaboratorError::InsufficientBalance { need: amount, have },
        ));
    }
    if from == to || amount == 0 {
        return Ok(());
    }
    let credit = decode_u128(tree.get(to)?.as_deref()).map_err(ConflictableTransactionError::Abort)?;
    let credited = credit
        .checked_add(amount)
        .ok_or(ConflictableTransactionError::Abort(CollaboratorError::Overflow))?;
    tree.insert(from, &(have - amount).to_be_bytes()[..])?;
    tree.insert(to, &credited.to_be_bytes()[..])?;
    Ok(())
}

impl AssetStore {
    /// Open or create a standalone asset store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CollaboratorError> {
        let db = sled::open(path).map_err(storage)?;
        Self::with_db(db)
    }

    /// Use trees inside an already-open database.
    pub fn with_db(db: sled::Db) -> Result<Self, CollaboratorError> {
        let balances = db.open_tree("assets/token_balances").map_err(storage)?;
        let allowances = db.open_tree("assets/allowances").map_err(storage)?;
        let native = db.open_tree("assets/native_balances").map_err(storage)?;
        let contracts = db.open_tree("assets/contracts").map_err(storage)?;
        Ok(Self { _db: db, balances, allowances, native, contracts })
    }

    // ── Token administration ─────────────────────────────────────────────────

    /// Credit freshly issued tokens. Development faucet only.
    pub fn mint(&self, token: &Address, to: &Address, amount: Balance) -> Result<(), CollaboratorError> {
        let key = balance_key(token, to);
        self.balances
            .transaction(|tree| {
                let have = decode_u128(tree.get(&key)?.as_deref())
                    .map_err(ConflictableTransactionError::Abort)?;
                let next = have
                    .checked_add(amount)
                    .ok_or(ConflictableTransactionError::Abort(CollaboratorError::Overflow))?;
                tree.insert(key.as_slice(), &next.to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(tx_err)?;
        info!(%token, %to, amount, "minted");
        Ok(())
    }

    /// Set the allowance `owner` grants `spender`, replacing any previous one.
    pub fn approve(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError> {
        self.allowances
            .insert(allowance_key(token, owner, spender), &amount.to_be_bytes()[..])
            .map_err(storage)?;
        debug!(%token, %owner, %spender, amount, "approved");
        Ok(())
    }

    pub fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Balance, CollaboratorError> {
        let v = self
            .allowances
            .get(allowance_key(token, owner, spender))
            .map_err(storage)?;
        decode_u128(v.as_deref())
    }

    // ── Native currency ──────────────────────────────────────────────────────

    /// Credit native currency regardless of the recipient's wishes, the way a
    /// terminating contract can force a balance onto any address.
    pub fn force_native(&self, to: &Address, amount: Balance) -> Result<(), CollaboratorError> {
        let key = to.as_bytes().to_vec();
        self.native
            .transaction(|tree| {
                let have = decode_u128(tree.get(&key)?.as_deref())
                    .map_err(ConflictableTransactionError::Abort)?;
                let next = have
                    .checked_add(amount)
                    .ok_or(ConflictableTransactionError::Abort(CollaboratorError::Overflow))?;
                tree.insert(key.as_slice(), &next.to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(tx_err)?;
        info!(%to, amount, "forced native balance");
        Ok(())
    }

    // ── Contract registry ────────────────────────────────────────────────────

    /// Mark `address` as a contract, optionally exposing an owner list.
    pub fn register_contract(
        &self,
        address: &Address,
        owners: Option<Vec<Address>>,
    ) -> Result<(), CollaboratorError> {
        let bytes = bincode::serialize(&ContractInfo { owners }).map_err(storage)?;
        self.contracts.insert(address.as_bytes(), bytes).map_err(storage)?;
        info!(%address, "registered contract");
        Ok(())
    }

    fn contract(&self, address: &Address) -> Result<Option<ContractInfo>, CollaboratorError> {
        match self.contracts.get(address.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(storage)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), CollaboratorError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}

impl TokenLedger for AssetStore {
    fn balance_of(&self, token: &Address, holder: &Address) -> Result<Balance, CollaboratorError> {
        let v = self.balances.get(balance_key(token, holder)).map_err(storage)?;
        decode_u128(v.as_deref())
    }

    fn pull(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError> {
        let from_key = balance_key(token, from);
        let to_key = balance_key(token, spender);
        let allow_key = allowance_key(token, from, spender);
        (&self.balances, &self.allowances)
            .transaction(|(balances, allowances)| {
                let allowed = decode_u128(allowances.get(&allow_key)?.as_deref())
                    .map_err(ConflictableTransactionError::Abort)?;
                if allowed < amount {
                    return Err(ConflictableTransactionError::Abort(
                        CollaboratorError::InsufficientAllowance { need: amount, have: allowed },
                    ));
                }
                move_within(balances, &from_key, &to_key, amount)?;
                allowances.insert(allow_key.as_slice(), &(allowed - amount).to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(tx_err)?;
        debug!(%token, %from, %spender, amount, "pulled");
        Ok(())
    }

    fn push(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError> {
        let from_key = balance_key(token, from);
        let to_key = balance_key(token, to);
        self.balances
            .transaction(|tree| move_within(tree, &from_key, &to_key, amount))
            .map_err(tx_err)?;
        debug!(%token, %from, %to, amount, "pushed");
        Ok(())
    }
}

impl NativeLedger for AssetStore {
    fn native_balance(&self, holder: &Address) -> Result<Balance, CollaboratorError> {
        let v = self.native.get(holder.as_bytes()).map_err(storage)?;
        decode_u128(v.as_deref())
    }

    fn push_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), CollaboratorError> {
        let from_key = from.as_bytes().to_vec();
        let to_key = to.as_bytes().to_vec();
        self.native
            .transaction(|tree| move_within(tree, &from_key, &to_key, amount))
            .map_err(tx_err)?;
        debug!(%from, %to, amount, "pushed native");
        Ok(())
    }
}

impl CustodianProbe for AssetStore {
    fn is_contract(&self, address: &Address) -> Result<bool, CollaboratorError> {
        self.contracts.contains_key(address.as_bytes()).map_err(storage)
    }

    fn get_owners(&self, address: &Address) -> Result<Option<Vec<Address>>, CollaboratorError> {
        Ok(self.contract(address)?.and_then(|c| c.owners))
    }
}
