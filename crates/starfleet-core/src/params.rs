use serde::{Deserialize, Serialize};

use crate::error::StakeError;
use crate::ledger::LedgerConfig;
use crate::phase::{PhaseClock, PhaseDurations};
use crate::threshold::ThresholdPolicy;
use crate::types::{Address, Timestamp};

/// Deployment parameters, usually read from a JSON file.
///
/// ```json
/// {
///   "ledger": "0x00000000000000000000000000000000000000aa",
///   "owner":  "0x238f1746f5b5e31ff71306084324e26d922447d4",
///   "token":  "0xaa7a9ca87d3694b5755f213b5d04094b8d0f0a6f",
///   "start_time": 0
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    /// Address the pooled tokens are held under.
    pub ledger: Address,
    pub owner: Address,
    /// The managed token.
    pub token: Address,
    /// Start of boarding. 0 means "the deployment time".
    #[serde(default)]
    pub start_time: Timestamp,
    #[serde(default)]
    pub min_threshold: Option<u128>,
    #[serde(default)]
    pub max_threshold: Option<u128>,
    #[serde(default)]
    pub durations: Option<PhaseDurations>,
}

impl DeployParams {
    pub fn new(ledger: Address, owner: Address, token: Address, start_time: Timestamp) -> Self {
        Self {
            ledger,
            owner,
            token,
            start_time,
            min_threshold: None,
            max_threshold: None,
            durations: None,
        }
    }

    /// Resolve defaults against the deployment time.
    pub fn to_config(&self, now: Timestamp) -> Result<LedgerConfig, StakeError> {
        if self.ledger.is_zero() || self.owner.is_zero() || self.token.is_zero() {
            return Err(StakeError::ZeroAddress);
        }
        let defaults = ThresholdPolicy::default();
        let thresholds = ThresholdPolicy::new(
            self.min_threshold.unwrap_or(defaults.min_threshold),
            self.max_threshold.unwrap_or(defaults.max_threshold),
        );
        let t_zero = if self.start_time == 0 { now } else { self.start_time };
        Ok(LedgerConfig {
            ledger: self.ledger,
            token: self.token,
            clock: PhaseClock::new(t_zero, self.durations.unwrap_or_default()),
            thresholds,
            deployed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MAX_THRESHOLD, MIN_THRESHOLD};

    #[test]
    fn zero_start_time_means_now() {
        let p = DeployParams::new(
            Address::from_low_u64(1),
            Address::from_low_u64(2),
            Address::from_low_u64(3),
            0,
        );
        let cfg = p.to_config(1_700_000_000).unwrap();
        assert_eq!(cfg.clock.t_zero(), 1_700_000_000);
        assert_eq!(cfg.thresholds.min_threshold, MIN_THRESHOLD);
        assert_eq!(cfg.thresholds.max_threshold, MAX_THRESHOLD);
        assert_eq!(cfg.clock.durations(), PhaseDurations::STANDARD);
    }

    #[test]
    fn zero_owner_rejected() {
        let p = DeployParams::new(Address::from_low_u64(1), Address::ZERO, Address::from_low_u64(3), 5);
        assert!(matches!(p.to_config(10), Err(StakeError::ZeroAddress)));
    }

    #[test]
    fn parses_minimal_json() {
        let json = r#"{
            "ledger": "0x00000000000000000000000000000000000000aa",
            "owner": "0x238f1746f5b5e31ff71306084324e26d922447d4",
            "token": "0xaa7a9ca87d3694b5755f213b5d04094b8d0f0a6f",
            "start_time": 1613579313
        }"#;
        let p: DeployParams = serde_json::from_str(json).unwrap();
        assert_eq!(p.start_time, 1_613_579_313);
        assert!(p.min_threshold.is_none());
        assert_eq!(p.to_config(0).unwrap().clock.t_zero(), 1_613_579_313);
    }
}
