//! End-to-end lifecycle runs against the sled-backed asset store.

use std::sync::Arc;

use starfleet_assets::AssetStore;
use starfleet_core::collaborator::{NativeLedger, TokenLedger};
use starfleet_core::error::{ErrorKind, StakeError};
use starfleet_core::event::LedgerEvent;
use starfleet_core::params::DeployParams;
use starfleet_core::phase::Phase;
use starfleet_core::{Address, Balance, Timestamp, MAX_THRESHOLD, MIN_THRESHOLD, TOKEN_UNIT};
use starfleet_state::{deploy, LedgerQuery, StakeEngine, StateDb};

const T0: Timestamp = 1_613_579_313;

struct Harness {
    engine: StakeEngine<AssetStore>,
    token: Address,
    ledger: Address,
    owner: Address,
}

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn harness(name: &str) -> Harness {
    let dir = std::env::temp_dir().join(format!("starfleet_scenario_{}", name));
    let _ = std::fs::remove_dir_all(&dir);
    let db = sled::open(&dir).expect("open sled");
    let state = Arc::new(StateDb::with_db(db.clone()).expect("state trees"));
    let assets = AssetStore::with_db(db).expect("asset trees");

    let (ledger, owner, token) = (addr(0xAA), addr(1), addr(0x70));
    deploy(&state, &DeployParams::new(ledger, owner, token, T0), T0).expect("deploy");
    let engine = StakeEngine::new(state, assets).expect("engine");
    Harness { engine, token, ledger, owner }
}

impl Harness {
    fn fund(&self, who: Address, amount: Balance) {
        self.engine.assets().mint(&self.token, &who, amount).unwrap();
        let have = self.engine.assets().allowance(&self.token, &who, &self.ledger).unwrap();
        self.engine
            .assets()
            .approve(&self.token, &who, &self.ledger, have + amount)
            .unwrap();
    }

    fn deposit(&mut self, who: Address, amount: Balance, now: Timestamp) -> Result<Vec<LedgerEvent>, StakeError> {
        self.fund(who, amount);
        self.engine.deposit(who, amount, now)
    }

    fn balance(&self, who: &Address) -> Balance {
        self.engine.assets().balance_of(&self.token, who).unwrap()
    }

    fn multisig(&self, at: Address) {
        self.engine
            .assets()
            .register_contract(&at, Some(vec![addr(50), addr(51), addr(52)]))
            .unwrap();
    }

    fn assert_consistent(&self) {
        let problems = LedgerQuery::new(self.engine.db()).check_invariants().unwrap();
        assert!(problems.is_empty(), "invariants violated: {problems:?}");
    }
}

// ── Deployment ────────────────────────────────────────────────────────────────

#[test]
fn fresh_ledger_sanity() {
    let h = harness("fresh");
    assert_eq!(h.engine.owner().unwrap(), h.owner);
    assert_eq!(h.balance(&h.ledger), 0);
    assert_eq!(h.engine.get_number_of_participants().unwrap(), 0);
    assert_eq!(h.engine.t_zero(), T0);
    assert_eq!(h.engine.boarding_period_end(), T0 + h.engine.boarding_period_length());
    assert_eq!(h.engine.lock_period_end(), h.engine.boarding_period_end() + h.engine.lock_period_length());
    assert_eq!(h.engine.bridge_period_end(), h.engine.lock_period_end() + h.engine.bridge_period_length());
    assert!(matches!(h.engine.receive_native(addr(3), 1), Err(StakeError::NativeTransfersRefused)));
    h.assert_consistent();
}

// ── Boarding ──────────────────────────────────────────────────────────────────

#[test]
fn small_deposit_then_withdraw() {
    let mut h = harness("small_deposit");
    let a = addr(3);
    h.deposit(a, 1_000, T0 + 10).unwrap();
    assert_eq!(h.engine.get_stake(&a).unwrap(), 1_000);
    assert_eq!(h.engine.get_number_of_participants().unwrap(), 1);
    assert!(!h.engine.is_minimum_reached().unwrap());
    h.assert_consistent();

    h.engine.withdraw(a, T0 + 20).unwrap();
    assert_eq!(h.engine.get_stake(&a).unwrap(), 0);
    assert_eq!(h.engine.get_number_of_participants().unwrap(), 0);
    assert_eq!(h.balance(&a), 1_000);
    h.assert_consistent();
}

#[test]
fn minimum_freezes_withdrawals() {
    let mut h = harness("minimum_freezes");
    let a = addr(3);
    h.deposit(a, MIN_THRESHOLD, T0 + 10).unwrap();
    assert!(h.engine.is_minimum_reached().unwrap());
    let err = h.engine.withdraw(a, T0 + 20).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Threshold);
    assert_eq!(h.engine.get_stake(&a).unwrap(), MIN_THRESHOLD);
}

#[test]
fn cap_is_exclusive() {
    let mut h = harness("cap_exclusive");
    let err = h.deposit(addr(3), MAX_THRESHOLD, T0 + 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.engine.get_stake(&addr(3)).unwrap(), 0);

    h.engine.deposit(addr(4), 0, T0 + 10).unwrap_err();
    h.deposit(addr(4), MAX_THRESHOLD - 1, T0 + 10).unwrap();
    assert_eq!(h.engine.get_stake(&addr(4)).unwrap(), MAX_THRESHOLD - 1);
    // Topping up by one unit would reach the cap.
    assert_eq!(h.deposit(addr(4), 1, T0 + 11).unwrap_err().kind(), ErrorKind::Validation);
    h.assert_consistent();
}

#[test]
fn late_deposit_refused_but_withdraw_allowed() {
    let mut h = harness("late_deposit");
    let a = addr(3);
    h.deposit(a, 5 * TOKEN_UNIT, T0 + 10).unwrap();
    let late = h.engine.boarding_period_end();
    assert_eq!(h.engine.phase(late), Phase::Locked);

    let err = h.deposit(addr(4), TOKEN_UNIT, late).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Phase);
    h.engine.withdraw(a, late + 1).unwrap();
    assert_eq!(h.balance(&a), 5 * TOKEN_UNIT);
    h.assert_consistent();
}

#[test]
fn deposit_without_approval_fails_cleanly() {
    let mut h = harness("no_approval");
    h.engine.assets().mint(&h.token, &addr(3), 100).unwrap();
    let err = h.engine.deposit(addr(3), 100, T0 + 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);
    assert_eq!(h.balance(&addr(3)), 100);
    assert_eq!(h.engine.get_number_of_participants().unwrap(), 0);
    assert!(h.engine.events().unwrap().is_empty());
}

// ── Bridge ────────────────────────────────────────────────────────────────────

#[test]
fn bridge_moves_everything_to_custodian() {
    let mut h = harness("bridge");
    h.deposit(addr(3), MIN_THRESHOLD / 2, T0 + 1).unwrap();
    h.deposit(addr(4), MIN_THRESHOLD / 2, T0 + 2).unwrap();
    // Tokens sent straight to the ledger are swept along with the stake.
    h.engine.assets().mint(&h.token, &h.ledger, 7).unwrap();

    let custodian = addr(90);
    h.multisig(custodian);

    let early = h.engine.lock_period_end() - 1;
    assert_eq!(h.engine.transfer_tokens(h.owner, custodian, early).unwrap_err().kind(), ErrorKind::Phase);
    assert_eq!(
        h.engine.transfer_tokens(addr(3), custodian, h.engine.lock_period_end()).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    let at = h.engine.lock_period_end();
    h.engine.transfer_tokens(h.owner, custodian, at).unwrap();
    assert_eq!(h.balance(&h.ledger), 0);
    assert_eq!(h.balance(&custodian), MIN_THRESHOLD + 7);
    assert_eq!(h.engine.get_bridged_stake(&addr(4)).unwrap(), MIN_THRESHOLD / 2);
    assert_eq!(h.engine.totals().unwrap().bridged_stake, MIN_THRESHOLD);
    h.assert_consistent();

    let again = h.engine.transfer_tokens(h.owner, custodian, at + 1).unwrap_err();
    assert_eq!(again.kind(), ErrorKind::State);
}

#[test]
fn bridge_refuses_plain_address_custodian() {
    let mut h = harness("bridge_plain");
    h.deposit(addr(3), MIN_THRESHOLD, T0 + 1).unwrap();
    let at = h.engine.lock_period_end();
    let err = h.engine.transfer_tokens(h.owner, addr(90), at).unwrap_err();
    assert!(matches!(err, StakeError::CustodianNotContract(_)));
    h.engine.assets().register_contract(&addr(91), None).unwrap();
    let err = h.engine.transfer_tokens(h.owner, addr(91), at).unwrap_err();
    assert!(matches!(err, StakeError::CustodianNoOwnerRegistry(_)));
    assert_eq!(h.balance(&h.ledger), MIN_THRESHOLD);
}

#[test]
fn bridge_window_closes() {
    let mut h = harness("bridge_closes");
    h.deposit(addr(3), MIN_THRESHOLD, T0 + 1).unwrap();
    h.multisig(addr(90));
    let late = h.engine.bridge_period_end();
    assert_eq!(h.engine.transfer_tokens(h.owner, addr(90), late).unwrap_err().kind(), ErrorKind::Phase);
}

// ── Closed phase ──────────────────────────────────────────────────────────────

#[test]
fn unmet_minimum_refunds_after_boarding() {
    let mut h = harness("unmet_refund");
    for n in 3..8 {
        h.deposit(addr(n), 1_000 * TOKEN_UNIT, T0 + n as i64).unwrap();
    }
    let closed = h.engine.bridge_period_end() + 1;
    for n in 3..8 {
        h.engine.withdraw(addr(n), closed).unwrap();
        assert_eq!(h.balance(&addr(n)), 1_000 * TOKEN_UNIT);
    }
    assert_eq!(h.engine.get_number_of_participants().unwrap(), 0);
    assert_eq!(h.balance(&h.ledger), 0);
    h.assert_consistent();
}

#[test]
fn entitlements_lifecycle() {
    let mut h = harness("entitlements");
    h.deposit(addr(3), MIN_THRESHOLD, T0 + 1).unwrap();
    let closed = h.engine.bridge_period_end();
    let a = addr(7);

    h.engine.account_startrac(h.owner, &[a], &[500], false, closed).unwrap();
    h.engine.account_startrac(h.owner, &[a], &[999], false, closed).unwrap();
    assert_eq!(h.engine.get_startrac_amount(&a).unwrap(), 500);

    h.engine.account_startrac(h.owner, &[a], &[999], true, closed).unwrap();
    assert_eq!(h.engine.get_startrac_amount(&a).unwrap(), 999);

    h.engine.fallback_withdraw_tokens(a, closed + 1).unwrap();
    assert_eq!(h.balance(&a), 999);
    let err = h.engine.fallback_withdraw_tokens(a, closed + 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let paid = h.engine.totals().unwrap().entitlement_paid;
    assert_eq!(paid, 999);
    assert_eq!(h.balance(&h.ledger), MIN_THRESHOLD - paid);
}

#[test]
fn full_launch_pays_entitlements() {
    let mut h = harness("full_launch");
    h.deposit(addr(3), MIN_THRESHOLD / 2, T0 + 1).unwrap();
    h.deposit(addr(4), MIN_THRESHOLD / 2, T0 + 2).unwrap();
    let custodian = addr(90);
    h.multisig(custodian);
    h.engine.transfer_tokens(h.owner, custodian, h.engine.lock_period_end()).unwrap();
    assert_eq!(h.balance(&h.ledger), 0);

    let closed = h.engine.bridge_period_end();
    let (a, b) = (addr(7), addr(8));
    let report = h
        .engine
        .account_startrac(h.owner, &[a, b], &[300 * TOKEN_UNIT, 200 * TOKEN_UNIT], false, closed)
        .unwrap();
    assert_eq!(report.assigned, 2);
    assert_eq!(h.engine.get_startrac_amount(&a).unwrap(), 300 * TOKEN_UNIT);

    // Custodian returns the secondary pool to the ledger for payout.
    h.engine.assets().mint(&h.token, &h.ledger, 500 * TOKEN_UNIT).unwrap();
    h.engine.fallback_withdraw_tokens(a, closed + 1).unwrap();
    h.engine.fallback_withdraw_tokens(b, closed + 2).unwrap();
    assert_eq!(h.balance(&a), 300 * TOKEN_UNIT);
    assert_eq!(h.balance(&b), 200 * TOKEN_UNIT);
    assert_eq!(h.balance(&h.ledger), 0);
    assert_eq!(h.engine.totals().unwrap().entitlement_paid, 500 * TOKEN_UNIT);
    h.assert_consistent();

    let err = h.engine.fallback_withdraw_tokens(a, closed + 3).unwrap_err();
    assert!(matches!(err, StakeError::EntitlementAlreadyClaimed(_)));
}

#[test]
fn snapshot_before_close_refused() {
    let mut h = harness("snapshot_early");
    h.deposit(addr(3), MIN_THRESHOLD, T0 + 1).unwrap();
    let err = h
        .engine
        .account_startrac(h.owner, &[addr(7)], &[1], false, h.engine.bridge_period_end() - 1)
        .unwrap_err();
    assert!(matches!(err, StakeError::WrongPhase { expected: Phase::Closed, actual: Phase::BridgeWindow }));
}

// ── Ownership & recovery ──────────────────────────────────────────────────────

#[test]
fn ownership_handover() {
    let mut h = harness("ownership");
    let next = addr(2);
    assert_eq!(h.engine.transfer_ownership(addr(3), next, T0).unwrap_err().kind(), ErrorKind::Authorization);
    h.engine.transfer_ownership(h.owner, next, T0).unwrap();
    assert_eq!(h.engine.owner().unwrap(), next);
    assert!(matches!(h.engine.renounce_ownership(next), Err(StakeError::RenounceDisabled)));
    assert!(matches!(h.engine.renounce_ownership(h.owner), Err(StakeError::NotOwner(_))));
}

#[test]
fn misplaced_assets_recovered_to_owner() {
    let mut h = harness("recovery");
    let foreign = addr(0x71);
    h.deposit(addr(3), 100, T0 + 1).unwrap();
    h.engine.assets().mint(&foreign, &h.ledger, 55).unwrap();
    h.engine.assets().force_native(&h.ledger, 9).unwrap();

    let err = h.engine.withdraw_misplaced_tokens(h.owner, h.token, T0 + 2).unwrap_err();
    assert!(matches!(err, StakeError::CannotRecoverManagedToken(_)));

    h.engine.withdraw_misplaced_tokens(h.owner, foreign, T0 + 2).unwrap();
    assert_eq!(h.engine.assets().balance_of(&foreign, &h.owner).unwrap(), 55);
    h.engine.withdraw_misplaced_ether(h.owner, T0 + 2).unwrap();
    assert_eq!(h.engine.assets().native_balance(&h.owner).unwrap(), 9);
    assert_eq!(h.engine.assets().native_balance(&h.ledger).unwrap(), 0);

    // Sweeping an empty balance is a no-op that still succeeds.
    h.engine.withdraw_misplaced_ether(h.owner, T0 + 3).unwrap();
    assert_eq!(h.balance(&h.ledger), 100);
}

#[test]
fn events_are_sequenced() {
    let mut h = harness("events");
    h.deposit(addr(3), 10, T0 + 1).unwrap();
    h.engine.withdraw(addr(3), T0 + 2).unwrap();
    let events = h.engine.events().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].seq, 0);
    assert_eq!(events[1].seq, 1);
    assert_eq!(events[1].at, T0 + 2);
    assert_eq!(events[1].event, LedgerEvent::TokenWithdrawal { staker: addr(3), amount: 10 });
}
