use serde::{Deserialize, Serialize};

use crate::error::StakeError;
use crate::phase::PhaseClock;
use crate::threshold::ThresholdPolicy;
use crate::types::{Address, Balance, Timestamp};

// ── LedgerConfig ──────────────────────────────────────────────────────────────

/// Everything fixed at deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Address of the ledger itself, i.e. the holder of the pooled tokens.
    pub ledger: Address,
    /// The managed (staked) token.
    pub token: Address,
    pub clock: PhaseClock,
    pub thresholds: ThresholdPolicy,
    pub deployed_at: Timestamp,
}

// ── LedgerTotals ──────────────────────────────────────────────────────────────

/// Running totals, committed in the same write as every stake mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Always equal to the sum of live stakes.
    pub total_staked: Balance,
    /// Cumulative amount ever deposited.
    pub deposited: Balance,
    /// Cumulative amount returned through withdrawals.
    pub withdrawn: Balance,
    /// Live stake archived when the pool moved to the custodian.
    pub bridged_stake: Balance,
    /// Cumulative entitlement paid out.
    pub entitlement_paid: Balance,
}

impl LedgerTotals {
    /// Every deposited unit is still staked, was withdrawn, or was bridged.
    pub fn is_conserved(&self) -> bool {
        self.total_staked
            .checked_add(self.withdrawn)
            .and_then(|s| s.checked_add(self.bridged_stake))
            == Some(self.deposited)
    }

    /// Stake the launch was funded with: live stake before the bridge,
    /// the archived stake after it.
    pub fn committed_stake(&self) -> Balance {
        self.total_staked.saturating_add(self.bridged_stake)
    }

    /// Full reconciliation of the totals against the entitlement records.
    ///
    /// Entitlements are paid out of tokens sent to the ledger after the
    /// bridge, not out of deposits, so the payout side balances against the
    /// sum of claimed entitlements while the deposit side balances against
    /// stake, withdrawals and the bridge.
    pub fn reconciles(&self, claimed_total: Balance) -> bool {
        self.is_conserved() && self.entitlement_paid == claimed_total
    }
}

// ── CustodyState ──────────────────────────────────────────────────────────────

/// The single bridge transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub custodian: Address,
    /// Token balance actually moved (may exceed the stake if tokens were sent directly).
    pub amount: Balance,
    /// `total_staked` at the moment of transfer.
    pub staked_at_transfer: Balance,
    /// Live participants archived by the transfer.
    pub participants: u64,
    pub transferred_at: Timestamp,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyState {
    #[default]
    Pending,
    Transferred(CustodyRecord),
}

impl CustodyState {
    pub fn is_transferred(&self) -> bool {
        matches!(self, CustodyState::Transferred(_))
    }

    pub fn record(&self) -> Option<&CustodyRecord> {
        match self {
            CustodyState::Pending => None,
            CustodyState::Transferred(r) => Some(r),
        }
    }

    /// `Pending → Transferred`; any other transition is refused.
    pub fn transfer(&mut self, record: CustodyRecord) -> Result<(), StakeError> {
        match self {
            CustodyState::Pending => {
                *self = CustodyState::Transferred(record);
                Ok(())
            }
            CustodyState::Transferred(r) => Err(StakeError::CustodyAlreadyTransferred {
                custodian: r.custodian,
            }),
        }
    }
}

// ── Entitlement ───────────────────────────────────────────────────────────────

/// Secondary-pool entitlement of one address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entitlement {
    #[default]
    Unassigned,
    Assigned { amount: Balance, assigned_at: Timestamp },
    /// Terminal: nothing can re-arm a paid address.
    Claimed { amount: Balance, claimed_at: Timestamp },
}

/// What a snapshot row did to an entitlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    Overwritten,
    Cleared,
    SkippedZero,
    SkippedExisting,
    SkippedClaimed,
}

impl Entitlement {
    /// Amount currently claimable.
    pub fn claimable(&self) -> Balance {
        match self {
            Entitlement::Assigned { amount, .. } => *amount,
            _ => 0,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Entitlement::Claimed { .. })
    }

    /// Apply one snapshot row. Without `overwrite` only an empty slot is
    /// written; a zero amount written with `overwrite` clears the slot.
    pub fn assign(&mut self, amount: Balance, overwrite: bool, now: Timestamp) -> AssignOutcome {
        match self {
            Entitlement::Claimed { .. } => AssignOutcome::SkippedClaimed,
            Entitlement::Assigned { .. } if !overwrite => AssignOutcome::SkippedExisting,
            Entitlement::Assigned { .. } => {
                if amount == 0 {
                    *self = Entitlement::Unassigned;
                    AssignOutcome::Cleared
                } else {
                    *self = Entitlement::Assigned { amount, assigned_at: now };
                    AssignOutcome::Overwritten
                }
            }
            Entitlement::Unassigned => {
                if amount == 0 {
                    AssignOutcome::SkippedZero
                } else {
                    *self = Entitlement::Assigned { amount, assigned_at: now };
                    AssignOutcome::Assigned
                }
            }
        }
    }

    /// `Assigned → Claimed`, returning the amount to pay.
    pub fn claim(&mut self, holder: Address, now: Timestamp) -> Result<Balance, StakeError> {
        match self {
            Entitlement::Assigned { amount, .. } => {
                let amount = *amount;
                *self = Entitlement::Claimed { amount, claimed_at: now };
                Ok(amount)
            }
            Entitlement::Claimed { .. } => Err(StakeError::EntitlementAlreadyClaimed(holder)),
            Entitlement::Unassigned => Err(StakeError::NoEntitlement(holder)),
        }
    }
}
