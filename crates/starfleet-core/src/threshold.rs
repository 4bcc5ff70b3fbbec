use serde::{Deserialize, Serialize};

use crate::constants::{MAX_THRESHOLD, MIN_THRESHOLD};
use crate::error::StakeError;
use crate::types::Balance;

/// Aggregate unlock level and per-participant cap, fixed at deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub min_threshold: Balance,
    pub max_threshold: Balance,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            min_threshold: MIN_THRESHOLD,
            max_threshold: MAX_THRESHOLD,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(min_threshold: Balance, max_threshold: Balance) -> Self {
        Self { min_threshold, max_threshold }
    }

    /// `total_staked` must be the ledger's running total, never a token balance.
    pub fn is_minimum_reached(&self, total_staked: Balance) -> bool {
        total_staked >= self.min_threshold
    }

    /// Resulting stake of a participant holding `current` who adds `amount`.
    /// The cap is exclusive: the result must stay strictly below it.
    pub fn check_cap(&self, current: Balance, amount: Balance) -> Result<Balance, StakeError> {
        let resulting = current.checked_add(amount).ok_or(StakeError::Overflow)?;
        if resulting >= self.max_threshold {
            return Err(StakeError::CapExceeded {
                resulting,
                max: self.max_threshold,
            });
        }
        Ok(resulting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_is_inclusive() {
        let p = ThresholdPolicy::default();
        assert!(!p.is_minimum_reached(MIN_THRESHOLD - 1));
        assert!(p.is_minimum_reached(MIN_THRESHOLD));
        assert!(p.is_minimum_reached(MIN_THRESHOLD + 1));
    }

    #[test]
    fn cap_is_cumulative_and_exclusive() {
        let p = ThresholdPolicy::default();
        assert_eq!(p.check_cap(0, MAX_THRESHOLD - 1).unwrap(), MAX_THRESHOLD - 1);
        assert!(matches!(
            p.check_cap(0, MAX_THRESHOLD),
            Err(StakeError::CapExceeded { .. })
        ));
        // Two deposits that are each under the cap but together reach it.
        assert!(matches!(
            p.check_cap(MAX_THRESHOLD / 2, MAX_THRESHOLD / 2),
            Err(StakeError::CapExceeded { .. })
        ));
    }

    #[test]
    fn cap_overflow_is_reported() {
        let p = ThresholdPolicy::new(1, u128::MAX);
        assert!(matches!(p.check_cap(u128::MAX, 1), Err(StakeError::Overflow)));
    }
}
