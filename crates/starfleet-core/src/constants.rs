/// ─── Starfleet Stake Constants ──────────────────────────────────────────────
///
/// Boarding:  30 days of deposits from t_zero
/// Lock:     180 days, no deposits, withdrawals only while the minimum is unmet
/// Bridge:   180 days in which the owner may move the pool to the custodian
/// Closed:   everything after; entitlement accounting and claims only

// ── Time ─────────────────────────────────────────────────────────────────────

pub const DAY_SECS: i64 = 86_400;

/// Length of the boarding period (seconds). 30 days.
pub const BOARDING_PERIOD_LENGTH: i64 = 30 * DAY_SECS;

/// Length of the lock period (seconds). 180 days.
pub const LOCK_PERIOD_LENGTH: i64 = 180 * DAY_SECS;

/// Length of the bridge launch window (seconds). 180 days.
pub const BRIDGE_PERIOD_LENGTH: i64 = 180 * DAY_SECS;

// ── Amounts ──────────────────────────────────────────────────────────────────

/// 1 TRAC expressed in base units (18 decimals).
pub const TOKEN_UNIT: u128 = 1_000_000_000_000_000_000;

pub const MILLION_TOKENS: u128 = 1_000_000 * TOKEN_UNIT;

/// Aggregate stake that unlocks bridging and freezes withdrawals. 20M TRAC.
pub const MIN_THRESHOLD: u128 = 20 * MILLION_TOKENS;

/// Per-participant cumulative stake bound. 100M TRAC, exclusive.
pub const MAX_THRESHOLD: u128 = 100 * MILLION_TOKENS;
