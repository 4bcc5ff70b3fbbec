//! Lifecycle phases derived from a fixed start time.
//!
//! Nothing here is cached or scheduled: every query recomputes from the
//! `now` it is handed, so phases only ever move forward with the clock.
//!
//! ```text
//! t_zero        boarding_end        lock_end           bridge_end
//!   |--Boarding--|-------Locked-------|---BridgeWindow---|---Closed--->
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{BOARDING_PERIOD_LENGTH, BRIDGE_PERIOD_LENGTH, LOCK_PERIOD_LENGTH};
use crate::types::Timestamp;

/// Period lengths in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDurations {
    pub boarding: i64,
    pub lock: i64,
    pub bridge: i64,
}

impl PhaseDurations {
    /// 30 / 180 / 180 days.
    pub const STANDARD: PhaseDurations = PhaseDurations {
        boarding: BOARDING_PERIOD_LENGTH,
        lock: LOCK_PERIOD_LENGTH,
        bridge: BRIDGE_PERIOD_LENGTH,
    };
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    PreStart,
    Boarding,
    Locked,
    BridgeWindow,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::PreStart => "pre-start",
            Phase::Boarding => "boarding",
            Phase::Locked => "locked",
            Phase::BridgeWindow => "bridge-window",
            Phase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Stateless phase calculator over an immutable epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseClock {
    t_zero: Timestamp,
    durations: PhaseDurations,
}

impl PhaseClock {
    pub fn new(t_zero: Timestamp, durations: PhaseDurations) -> Self {
        Self { t_zero, durations }
    }

    pub fn t_zero(&self) -> Timestamp {
        self.t_zero
    }

    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    pub fn boarding_period_end(&self) -> Timestamp {
        self.t_zero + self.durations.boarding
    }

    pub fn lock_period_end(&self) -> Timestamp {
        self.boarding_period_end() + self.durations.lock
    }

    pub fn bridge_period_end(&self) -> Timestamp {
        self.lock_period_end() + self.durations.bridge
    }

    pub fn phase_at(&self, now: Timestamp) -> Phase {
        if now < self.t_zero {
            Phase::PreStart
        } else if now < self.boarding_period_end() {
            Phase::Boarding
        } else if now < self.lock_period_end() {
            Phase::Locked
        } else if now < self.bridge_period_end() {
            Phase::BridgeWindow
        } else {
            Phase::Closed
        }
    }

    /// `[start, end)` bounds of `phase`; `None` for an open end.
    pub fn window(&self, phase: Phase) -> (Option<Timestamp>, Option<Timestamp>) {
        match phase {
            Phase::PreStart => (None, Some(self.t_zero)),
            Phase::Boarding => (Some(self.t_zero), Some(self.boarding_period_end())),
            Phase::Locked => (Some(self.boarding_period_end()), Some(self.lock_period_end())),
            Phase::BridgeWindow => (Some(self.lock_period_end()), Some(self.bridge_period_end())),
            Phase::Closed => (Some(self.bridge_period_end()), None),
        }
    }

    /// Seconds until the current phase ends, `None` once closed.
    pub fn secs_until_next_phase(&self, now: Timestamp) -> Option<i64> {
        self.window(self.phase_at(now)).1.map(|end| end - now)
    }
}
