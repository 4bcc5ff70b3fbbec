use thiserror::Error;

use crate::phase::Phase;
use crate::types::{Address, Balance};

/// Failure classes reported to operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Called outside the window the operation is valid in.
    Phase,
    /// Aggregate minimum unmet or already reached.
    Threshold,
    /// Caller lacks the privilege.
    Authorization,
    /// Malformed input: zero amount/address, length mismatch, bad custodian.
    Validation,
    /// Ledger state forbids the call: nothing staked, nothing to claim, one-shot spent.
    State,
    /// The token ledger or custodian probe refused.
    Collaborator,
    /// Persistence failure.
    Storage,
}

/// Errors raised by the token and probe collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("insufficient allowance: need {need}, have {have}")]
    InsufficientAllowance { need: Balance, have: Balance },

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: Balance, have: Balance },

    #[error("balance overflow")]
    Overflow,

    #[error("collaborator storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum StakeError {
    // ── Phase errors ─────────────────────────────────────────────────────────
    #[error("wrong phase: operation requires {expected}, ledger is in {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    // ── Threshold errors ─────────────────────────────────────────────────────
    #[error("minimum threshold not reached: {total} staked, {min} required")]
    MinimumNotReached { total: Balance, min: Balance },

    #[error("minimum threshold already reached ({total} staked); withdrawals are frozen")]
    MinimumAlreadyReached { total: Balance },

    // ── Authorization errors ─────────────────────────────────────────────────
    #[error("caller {0} is not the owner")]
    NotOwner(Address),

    #[error("ownership cannot be renounced")]
    RenounceDisabled,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("participant cap exceeded: resulting stake {resulting} must stay below {max}")]
    CapExceeded { resulting: Balance, max: Balance },

    #[error("the zero address is not allowed here")]
    ZeroAddress,

    #[error("length mismatch: {contributors} contributors, {amounts} amounts")]
    LengthMismatch { contributors: usize, amounts: usize },

    #[error("custodian {0} is not a contract")]
    CustodianNotContract(Address),

    #[error("custodian {0} does not expose an owner registry")]
    CustodianNoOwnerRegistry(Address),

    #[error("custodian {0} has no owners")]
    CustodianNoOwners(Address),

    #[error("the ledger does not accept native currency")]
    NativeTransfersRefused,

    #[error("arithmetic overflow")]
    Overflow,

    // ── State errors ─────────────────────────────────────────────────────────
    #[error("{0} has no stake")]
    NoStake(Address),

    #[error("{0} has no entitlement")]
    NoEntitlement(Address),

    #[error("entitlement of {0} was already claimed")]
    EntitlementAlreadyClaimed(Address),

    #[error("tokens were already transferred to custodian {custodian}")]
    CustodyAlreadyTransferred { custodian: Address },

    #[error("{0} is the managed token and cannot be recovered")]
    CannotRecoverManagedToken(Address),

    #[error("a ledger is already deployed in this database")]
    AlreadyDeployed,

    #[error("no ledger deployed in this database")]
    NotDeployed,

    // ── Collaborator ─────────────────────────────────────────────────────────
    #[error("token ledger: {0}")]
    Collaborator(#[from] CollaboratorError),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StakeError {
    pub fn kind(&self) -> ErrorKind {
        use StakeError::*;
        match self {
            WrongPhase { .. } => ErrorKind::Phase,
            MinimumNotReached { .. } | MinimumAlreadyReached { .. } => ErrorKind::Threshold,
            NotOwner(_) | RenounceDisabled => ErrorKind::Authorization,
            ZeroAmount
            | CapExceeded { .. }
            | ZeroAddress
            | LengthMismatch { .. }
            | CustodianNotContract(_)
            | CustodianNoOwnerRegistry(_)
            | CustodianNoOwners(_)
            | NativeTransfersRefused
            | Overflow => ErrorKind::Validation,
            NoStake(_)
            | NoEntitlement(_)
            | EntitlementAlreadyClaimed(_)
            | CustodyAlreadyTransferred { .. }
            | CannotRecoverManagedToken(_)
            | AlreadyDeployed
            | NotDeployed => ErrorKind::State,
            Collaborator(_) => ErrorKind::Collaborator,
            Serialization(_) | Storage(_) => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let a = Address::from_low_u64(1);
        assert_eq!(
            StakeError::WrongPhase { expected: Phase::Boarding, actual: Phase::Locked }.kind(),
            ErrorKind::Phase
        );
        assert_eq!(StakeError::MinimumAlreadyReached { total: 1 }.kind(), ErrorKind::Threshold);
        assert_eq!(StakeError::NotOwner(a).kind(), ErrorKind::Authorization);
        assert_eq!(StakeError::CapExceeded { resulting: 2, max: 1 }.kind(), ErrorKind::Validation);
        assert_eq!(StakeError::CustodianNoOwners(a).kind(), ErrorKind::Validation);
        assert_eq!(StakeError::EntitlementAlreadyClaimed(a).kind(), ErrorKind::State);
        assert_eq!(StakeError::CannotRecoverManagedToken(a).kind(), ErrorKind::State);
        assert_eq!(
            StakeError::from(CollaboratorError::InsufficientAllowance { need: 5, have: 0 }).kind(),
            ErrorKind::Collaborator
        );
    }

    #[test]
    fn messages_name_the_failed_precondition() {
        let e = StakeError::WrongPhase { expected: Phase::BridgeWindow, actual: Phase::Locked };
        assert_eq!(
            e.to_string(),
            "wrong phase: operation requires bridge-window, ledger is in locked"
        );
    }
}
