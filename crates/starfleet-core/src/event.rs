use serde::{Deserialize, Serialize};

use crate::types::{Address, Balance, Timestamp};

/// Notification emitted by every committed mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    TokenDeposit {
        staker: Address,
        amount: Balance,
        stake: Balance,
    },
    TokenWithdrawal {
        staker: Address,
        amount: Balance,
    },
    TokensBridged {
        custodian: Address,
        amount: Balance,
    },
    EntitlementAssigned {
        contributor: Address,
        amount: Balance,
    },
    EntitlementClaimed {
        contributor: Address,
        amount: Balance,
    },
    MisplacedTokensRecovered {
        token: Address,
        to: Address,
        amount: Balance,
    },
    MisplacedEtherRecovered {
        to: Address,
        amount: Balance,
    },
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
    },
}

/// A persisted event with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: Timestamp,
    pub event: LedgerEvent,
}
