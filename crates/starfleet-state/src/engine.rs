use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use starfleet_core::collaborator::{CustodianProbe, NativeLedger, TokenLedger};
use starfleet_core::error::StakeError;
use starfleet_core::event::{EventRecord, LedgerEvent};
use starfleet_core::ledger::{
    AssignOutcome, CustodyRecord, CustodyState, Entitlement, LedgerConfig, LedgerTotals,
};
use starfleet_core::phase::Phase;
use starfleet_core::types::{Address, Balance, Timestamp};
use tracing::{debug, error, info, warn};

use crate::db::{StagedWrites, StateDb};

/// Everything the engine needs from the outside world.
pub trait Environment: TokenLedger + NativeLedger + CustodianProbe {}

impl<T: TokenLedger + NativeLedger + CustodianProbe> Environment for T {}

/// Per-row accounting of one `account_startrac` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub assigned: usize,
    pub overwritten: usize,
    pub cleared: usize,
    pub skipped_zero: usize,
    pub skipped_existing: usize,
    pub skipped_claimed: usize,
    pub events: Vec<LedgerEvent>,
}

// ── StakeEngine ───────────────────────────────────────────────────────────────

/// The staking ledger's state machine.
///
/// Every mutating call validates all of its preconditions first, performs
/// at most one external transfer, then commits its staged writes in a single
/// database transaction. `&mut self` keeps callers strictly serialized.
pub struct StakeEngine<A: Environment> {
    db: Arc<StateDb>,
    assets: A,
    config: LedgerConfig,
}

impl<A: Environment> StakeEngine<A> {
    /// Load a deployed ledger.
    pub fn new(db: Arc<StateDb>, assets: A) -> Result<Self, StakeError> {
        let config = db.config()?;
        Ok(Self { db, assets, config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn db(&self) -> &StateDb {
        &self.db
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    // ── Read-only surface ─────────────────────────────────────────────────────

    pub fn phase(&self, now: Timestamp) -> Phase {
        self.config.clock.phase_at(now)
    }

    pub fn t_zero(&self) -> Timestamp {
        self.config.clock.t_zero()
    }

    pub fn boarding_period_end(&self) -> Timestamp {
        self.config.clock.boarding_period_end()
    }

    pub fn lock_period_end(&self) -> Timestamp {
        self.config.clock.lock_period_end()
    }

    pub fn bridge_period_end(&self) -> Timestamp {
        self.config.clock.bridge_period_end()
    }

    pub fn boarding_period_length(&self) -> i64 {
        self.config.clock.durations().boarding
    }

    pub fn lock_period_length(&self) -> i64 {
        self.config.clock.durations().lock
    }

    pub fn bridge_period_length(&self) -> i64 {
        self.config.clock.durations().bridge
    }

    pub fn owner(&self) -> Result<Address, StakeError> {
        self.db.owner()
    }

    pub fn totals(&self) -> Result<LedgerTotals, StakeError> {
        self.db.totals()
    }

    pub fn events(&self) -> Result<Vec<EventRecord>, StakeError> {
        self.db.events()
    }

    pub fn get_stake(&self, addr: &Address) -> Result<Balance, StakeError> {
        self.db.get_stake(addr)
    }

    pub fn get_number_of_participants(&self) -> Result<u64, StakeError> {
        self.db.participant_count()
    }

    /// Current participants. Order is not meaningful.
    pub fn get_participants(&self) -> Result<Vec<Address>, StakeError> {
        self.db.participants()
    }

    pub fn total_staked(&self) -> Result<Balance, StakeError> {
        Ok(self.db.totals()?.total_staked)
    }

    pub fn is_minimum_reached(&self) -> Result<bool, StakeError> {
        Ok(self.config.thresholds.is_minimum_reached(self.total_staked()?))
    }

    pub fn get_startrac_amount(&self, addr: &Address) -> Result<Balance, StakeError> {
        Ok(self.db.get_entitlement(addr)?.claimable())
    }

    pub fn get_bridged_stake(&self, addr: &Address) -> Result<Balance, StakeError> {
        self.db.get_bridged_stake(addr)
    }

    pub fn custody(&self) -> Result<CustodyState, StakeError> {
        self.db.custody()
    }

    // ── Guards ────────────────────────────────────────────────────────────────

    fn require_owner(&self, caller: &Address) -> Result<Address, StakeError> {
        let owner = self.db.owner()?;
        if *caller != owner {
            return Err(StakeError::NotOwner(*caller));
        }
        Ok(owner)
    }

    fn require_phase(&self, expected: Phase, now: Timestamp) -> Result<(), StakeError> {
        let actual = self.phase(now);
        if actual != expected {
            return Err(StakeError::WrongPhase { expected, actual });
        }
        Ok(())
    }

    fn require_minimum(&self, totals: &LedgerTotals) -> Result<(), StakeError> {
        let min = self.config.thresholds.min_threshold;
        if !self.config.thresholds.is_minimum_reached(totals.total_staked) {
            return Err(StakeError::MinimumNotReached { total: totals.total_staked, min });
        }
        Ok(())
    }

    /// Like `require_minimum`, but stake already handed to the custodian
    /// still counts, so the launch stays funded after the bridge.
    fn require_launch_funded(&self, totals: &LedgerTotals) -> Result<(), StakeError> {
        let committed = totals.committed_stake();
        if !self.config.thresholds.is_minimum_reached(committed) {
            return Err(StakeError::MinimumNotReached {
                total: committed,
                min: self.config.thresholds.min_threshold,
            });
        }
        Ok(())
    }

    // ── Participant set ───────────────────────────────────────────────────────

    /// Append `addr` at the next free slot.
    fn stage_add_participant(&self, staged: &mut StagedWrites, addr: Address) -> Result<(), StakeError> {
        let count = self.db.participant_count()?;
        staged.participants.push((count, Some(addr)));
        staged.participant_slots.push((addr, Some(count)));
        staged.participant_count = Some(count + 1);
        Ok(())
    }

    /// Swap the last participant into `addr`'s slot and truncate.
    fn stage_remove_participant(&self, staged: &mut StagedWrites, addr: Address) -> Result<(), StakeError> {
        let count = self.db.participant_count()?;
        let slot = self
            .db
            .participant_slot(&addr)?
            .ok_or_else(|| StakeError::Storage(format!("participant index has no slot for {addr}")))?;
        let last = count
            .checked_sub(1)
            .ok_or_else(|| StakeError::Storage("participant count underflow".into()))?;
        if slot != last {
            let moved = self
                .db
                .participant_at(last)?
                .ok_or_else(|| StakeError::Storage(format!("participant slot {last} is empty")))?;
            staged.participants.push((slot, Some(moved)));
            staged.participant_slots.push((moved, Some(slot)));
        }
        staged.participants.push((last, None));
        staged.participant_slots.push((addr, None));
        staged.participant_count = Some(last);
        Ok(())
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    fn commit(
        &self,
        mut staged: StagedWrites,
        events: Vec<LedgerEvent>,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        let seq = self.db.next_event_seq()?;
        staged.events = events
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, event)| EventRecord { seq: seq + i as u64, at: now, event })
            .collect();
        self.db.commit(&staged)?;
        for event in &events {
            info!(?event, "committed");
        }
        Ok(events)
    }

    /// Commit after tokens already left the ledger. Nothing can pull them
    /// back, so a failed commit is surfaced for manual reconciliation.
    fn commit_after_push(
        &self,
        staged: StagedWrites,
        events: Vec<LedgerEvent>,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        self.commit(staged, events, now).map_err(|e| {
            error!(error = %e, "external transfer executed but ledger commit failed; reconcile manually");
            e
        })
    }

    // ── StakeLedger ───────────────────────────────────────────────────────────

    /// Stake `amount` during boarding. The caller must have approved the
    /// ledger for at least `amount` on the managed token.
    pub fn deposit(
        &mut self,
        caller: Address,
        amount: Balance,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        self.require_phase(Phase::Boarding, now)?;
        if amount == 0 {
            return Err(StakeError::ZeroAmount);
        }
        let current = self.db.get_stake(&caller)?;
        let resulting = self.config.thresholds.check_cap(current, amount)?;

        let mut totals = self.db.totals()?;
        totals.total_staked = totals.total_staked.checked_add(amount).ok_or(StakeError::Overflow)?;
        totals.deposited = totals.deposited.checked_add(amount).ok_or(StakeError::Overflow)?;

        let mut staged = StagedWrites::default();
        staged.stakes.push((caller, Some(resulting)));
        if current == 0 {
            self.stage_add_participant(&mut staged, caller)?;
        }
        staged.totals = Some(totals);

        let (token, ledger) = (self.config.token, self.config.ledger);
        self.assets.pull(&token, &ledger, &caller, amount)?;

        let events = vec![LedgerEvent::TokenDeposit { staker: caller, amount, stake: resulting }];
        match self.commit(staged, events, now) {
            Ok(events) => Ok(events),
            Err(e) => {
                // The ledger still holds the pulled tokens; hand them back.
                if let Err(refund) = self.assets.push(&token, &ledger, &caller, amount) {
                    error!(%caller, amount, error = %refund, "deposit refund failed after commit error");
                }
                Err(e)
            }
        }
    }

    /// Return the caller's whole stake. Open whenever the aggregate minimum
    /// is unmet, regardless of phase.
    pub fn withdraw(&mut self, caller: Address, now: Timestamp) -> Result<Vec<LedgerEvent>, StakeError> {
        let stake = self.db.get_stake(&caller)?;
        if stake == 0 {
            return Err(StakeError::NoStake(caller));
        }
        let mut totals = self.db.totals()?;
        if self.config.thresholds.is_minimum_reached(totals.total_staked) {
            return Err(StakeError::MinimumAlreadyReached { total: totals.total_staked });
        }
        totals.total_staked = totals
            .total_staked
            .checked_sub(stake)
            .ok_or_else(|| StakeError::Storage("total_staked below individual stake".into()))?;
        totals.withdrawn = totals.withdrawn.checked_add(stake).ok_or(StakeError::Overflow)?;

        let mut staged = StagedWrites::default();
        staged.stakes.push((caller, None));
        self.stage_remove_participant(&mut staged, caller)?;
        staged.totals = Some(totals);

        let (token, ledger) = (self.config.token, self.config.ledger);
        self.assets.push(&token, &ledger, &caller, stake)?;

        self.commit_after_push(
            staged,
            vec![LedgerEvent::TokenWithdrawal { staker: caller, amount: stake }],
            now,
        )
    }

    // ── CustodyBridge ─────────────────────────────────────────────────────────

    /// Move the ledger's entire token balance to a multisig custodian.
    /// One-shot: the live stake table is archived and cleared.
    pub fn transfer_tokens(
        &mut self,
        caller: Address,
        custodian: Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        self.require_owner(&caller)?;
        self.require_phase(Phase::BridgeWindow, now)?;
        let mut custody = self.db.custody()?;
        if let CustodyState::Transferred(r) = &custody {
            return Err(StakeError::CustodyAlreadyTransferred { custodian: r.custodian });
        }
        let mut totals = self.db.totals()?;
        self.require_minimum(&totals)?;
        self.validate_custodian(&custodian)?;

        let (token, ledger) = (self.config.token, self.config.ledger);
        let amount = self.assets.balance_of(&token, &ledger)?;

        let mut staged = StagedWrites::default();
        let stakes = self.db.iter_stakes()?;
        let participants = self.db.participant_count()?;
        for (addr, stake) in &stakes {
            staged.stakes.push((*addr, None));
            staged.participant_slots.push((*addr, None));
            staged.bridged_stakes.push((*addr, *stake));
        }
        for slot in 0..participants {
            staged.participants.push((slot, None));
        }
        staged.participant_count = Some(0);

        let staked_at_transfer = totals.total_staked;
        totals.bridged_stake = totals
            .bridged_stake
            .checked_add(staked_at_transfer)
            .ok_or(StakeError::Overflow)?;
        totals.total_staked = 0;
        staged.totals = Some(totals);

        custody.transfer(CustodyRecord {
            custodian,
            amount,
            staked_at_transfer,
            participants,
            transferred_at: now,
        })?;
        staged.custody = Some(custody);

        if amount > 0 {
            self.assets.push(&token, &ledger, &custodian, amount)?;
        }
        info!(%custodian, amount, staked_at_transfer, participants, "bridged to custodian");

        self.commit_after_push(staged, vec![LedgerEvent::TokensBridged { custodian, amount }], now)
    }

    fn validate_custodian(&self, custodian: &Address) -> Result<(), StakeError> {
        if custodian.is_zero() {
            return Err(StakeError::ZeroAddress);
        }
        if !self.assets.is_contract(custodian)? {
            return Err(StakeError::CustodianNotContract(*custodian));
        }
        match self.assets.get_owners(custodian)? {
            None => Err(StakeError::CustodianNoOwnerRegistry(*custodian)),
            Some(owners) if owners.is_empty() => Err(StakeError::CustodianNoOwners(*custodian)),
            Some(owners) => {
                debug!(%custodian, owners = owners.len(), "custodian accepted");
                Ok(())
            }
        }
    }

    // ── EntitlementSnapshot ───────────────────────────────────────────────────

    /// Record secondary-pool entitlements once the launch was funded, before
    /// or after the bridge. Without `overwrite` an address that already holds
    /// an entitlement keeps it. Rows for an address that already claimed are
    /// ignored even with `overwrite`, so nobody is paid twice.
    pub fn account_startrac(
        &mut self,
        caller: Address,
        contributors: &[Address],
        amounts: &[Balance],
        overwrite: bool,
        now: Timestamp,
    ) -> Result<SnapshotReport, StakeError> {
        self.require_owner(&caller)?;
        self.require_phase(Phase::Closed, now)?;
        let totals = self.db.totals()?;
        self.require_launch_funded(&totals)?;
        if contributors.len() != amounts.len() {
            return Err(StakeError::LengthMismatch {
                contributors: contributors.len(),
                amounts: amounts.len(),
            });
        }
        if contributors.iter().any(Address::is_zero) {
            return Err(StakeError::ZeroAddress);
        }

        let mut report = SnapshotReport::default();
        let mut working: HashMap<Address, Entitlement> = HashMap::new();
        let mut staged = StagedWrites::default();
        for (addr, amount) in contributors.iter().zip(amounts) {
            let entry = match working.entry(*addr) {
                Entry::Occupied(o) => o.into_mut(),
                Entry::Vacant(v) => v.insert(self.db.get_entitlement(addr)?),
            };
            match entry.assign(*amount, overwrite, now) {
                AssignOutcome::Assigned => {
                    report.assigned += 1;
                    report.events.push(LedgerEvent::EntitlementAssigned { contributor: *addr, amount: *amount });
                }
                AssignOutcome::Overwritten => {
                    report.overwritten += 1;
                    report.events.push(LedgerEvent::EntitlementAssigned { contributor: *addr, amount: *amount });
                }
                AssignOutcome::Cleared => {
                    report.cleared += 1;
                    report.events.push(LedgerEvent::EntitlementAssigned { contributor: *addr, amount: 0 });
                }
                AssignOutcome::SkippedZero => report.skipped_zero += 1,
                AssignOutcome::SkippedExisting => report.skipped_existing += 1,
                AssignOutcome::SkippedClaimed => {
                    warn!(contributor = %addr, "entitlement already claimed; row ignored");
                    report.skipped_claimed += 1;
                }
            }
            staged.entitlements.push((*addr, entry.clone()));
        }

        let events = std::mem::take(&mut report.events);
        report.events = self.commit(staged, events, now)?;
        info!(
            rows = contributors.len(),
            assigned = report.assigned,
            overwritten = report.overwritten,
            skipped = report.skipped_existing + report.skipped_claimed,
            "entitlement snapshot applied"
        );
        Ok(report)
    }

    /// Pay out the caller's entitlement. Single claim per address.
    pub fn fallback_withdraw_tokens(
        &mut self,
        caller: Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        self.require_phase(Phase::Closed, now)?;
        let mut entitlement = self.db.get_entitlement(&caller)?;
        let amount = entitlement.claim(caller, now)?;

        let mut totals = self.db.totals()?;
        totals.entitlement_paid = totals.entitlement_paid.checked_add(amount).ok_or(StakeError::Overflow)?;

        let mut staged = StagedWrites::default();
        staged.entitlements.push((caller, entitlement));
        staged.totals = Some(totals);

        let (token, ledger) = (self.config.token, self.config.ledger);
        self.assets.push(&token, &ledger, &caller, amount)?;

        self.commit_after_push(
            staged,
            vec![LedgerEvent::EntitlementClaimed { contributor: caller, amount }],
            now,
        )
    }

    // ── AccessControl ─────────────────────────────────────────────────────────

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        let previous = self.require_owner(&caller)?;
        if new_owner.is_zero() {
            return Err(StakeError::ZeroAddress);
        }
        let staged = StagedWrites { owner: Some(new_owner), ..Default::default() };
        self.commit(staged, vec![LedgerEvent::OwnershipTransferred { previous, new_owner }], now)
    }

    /// Always refused: bridging and entitlement assignment need an owner.
    pub fn renounce_ownership(&mut self, caller: Address) -> Result<(), StakeError> {
        self.require_owner(&caller)?;
        Err(StakeError::RenounceDisabled)
    }

    // ── Recovery ──────────────────────────────────────────────────────────────

    /// Sweep a foreign token sent to the ledger by mistake to the owner.
    pub fn withdraw_misplaced_tokens(
        &mut self,
        caller: Address,
        token: Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        let owner = self.require_owner(&caller)?;
        if token == self.config.token {
            return Err(StakeError::CannotRecoverManagedToken(token));
        }
        let ledger = self.config.ledger;
        let amount = self.assets.balance_of(&token, &ledger)?;
        if amount > 0 {
            self.assets.push(&token, &ledger, &owner, amount)?;
        }
        self.commit_after_push(
            StagedWrites::default(),
            vec![LedgerEvent::MisplacedTokensRecovered { token, to: owner, amount }],
            now,
        )
    }

    /// Sweep native currency forced onto the ledger to the owner.
    pub fn withdraw_misplaced_ether(
        &mut self,
        caller: Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, StakeError> {
        let owner = self.require_owner(&caller)?;
        let ledger = self.config.ledger;
        let amount = self.assets.native_balance(&ledger)?;
        if amount > 0 {
            self.assets.push_native(&ledger, &owner, amount)?;
        }
        self.commit_after_push(
            StagedWrites::default(),
            vec![LedgerEvent::MisplacedEtherRecovered { to: owner, amount }],
            now,
        )
    }

    /// Ordinary native-currency transfers to the ledger are refused.
    pub fn receive_native(&self, from: Address, amount: Balance) -> Result<(), StakeError> {
        debug!(%from, amount, "refusing native transfer");
        Err(StakeError::NativeTransfersRefused)
    }
}
