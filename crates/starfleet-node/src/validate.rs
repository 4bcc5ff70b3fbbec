//! Post-deployment checks, run by `starfleet validate`.

use starfleet_core::error::StakeError;
use starfleet_core::phase::{Phase, PhaseDurations};
use starfleet_core::types::{Address, Timestamp};
use starfleet_state::{LedgerQuery, StateDb};

/// What the operator expects the deployed ledger to look like.
#[derive(Clone, Debug)]
pub struct Expectations {
    pub owner: Option<Address>,
    pub t_zero: Option<Timestamp>,
    pub durations: PhaseDurations,
    /// Phase the ledger should be in at validation time.
    pub phase: Option<Phase>,
}

impl Default for Expectations {
    fn default() -> Self {
        Self { owner: None, t_zero: None, durations: PhaseDurations::STANDARD, phase: None }
    }
}

/// One failed check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckFailure {
    pub check: String,
    pub expected: String,
    pub actual: String,
}

impl CheckFailure {
    fn new(check: &str, expected: impl ToString, actual: impl ToString) -> Self {
        Self { check: check.to_string(), expected: expected.to_string(), actual: actual.to_string() }
    }
}

/// Run every check and collect the failures.
pub fn validate(db: &StateDb, exp: &Expectations, now: Timestamp) -> Result<Vec<CheckFailure>, StakeError> {
    let cfg = db.config()?;
    let clock = cfg.clock;
    let mut failures = Vec::new();

    let t_zero = clock.t_zero();
    if let Some(want) = exp.t_zero {
        if t_zero != want {
            failures.push(CheckFailure::new("t_zero", want, t_zero));
        }
    }

    let got = clock.durations();
    let want = exp.durations;
    for (name, w, g) in [
        ("boarding period length", want.boarding, got.boarding),
        ("lock period length", want.lock, got.lock),
        ("bridge period length", want.bridge, got.bridge),
    ] {
        if w != g {
            failures.push(CheckFailure::new(name, w, g));
        }
    }

    let boarding_end = t_zero + want.boarding;
    let lock_end = boarding_end + want.lock;
    let bridge_end = lock_end + want.bridge;
    for (name, w, g) in [
        ("boarding period end", boarding_end, clock.boarding_period_end()),
        ("lock period end", lock_end, clock.lock_period_end()),
        ("bridge period end", bridge_end, clock.bridge_period_end()),
    ] {
        if w != g {
            failures.push(CheckFailure::new(name, w, g));
        }
    }

    if let Some(want) = exp.phase {
        let phase = clock.phase_at(now);
        if phase != want {
            failures.push(CheckFailure::new("phase", want, phase));
        }
    }

    if let Some(want) = exp.owner {
        let owner = db.owner()?;
        if owner != want {
            failures.push(CheckFailure::new("owner", want, owner));
        }
    }

    for problem in LedgerQuery::new(db).check_invariants()? {
        failures.push(CheckFailure::new("state invariant", "holds", problem));
    }
    Ok(failures)
}
