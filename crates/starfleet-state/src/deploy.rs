use starfleet_core::error::StakeError;
use starfleet_core::ledger::{CustodyState, LedgerConfig, LedgerTotals};
use starfleet_core::params::DeployParams;
use starfleet_core::types::Timestamp;
use tracing::info;

use crate::db::{StagedWrites, StateDb};

/// Write a fresh ledger into an empty `StateDb`.
///
/// This is the only place the configuration and the first owner are set.
/// Deploying over an existing ledger is refused.
pub fn deploy(db: &StateDb, params: &DeployParams, now: Timestamp) -> Result<LedgerConfig, StakeError> {
    if db.is_deployed()? {
        return Err(StakeError::AlreadyDeployed);
    }
    let config = params.to_config(now)?;

    let staged = StagedWrites {
        config: Some(config.clone()),
        owner: Some(params.owner),
        totals: Some(LedgerTotals::default()),
        custody: Some(CustodyState::Pending),
        participant_count: Some(0),
        ..Default::default()
    };
    db.commit(&staged)?;

    info!(
        ledger = %config.ledger,
        owner = %params.owner,
        token = %config.token,
        t_zero = config.clock.t_zero(),
        min_threshold = %config.thresholds.min_threshold,
        max_threshold = %config.thresholds.max_threshold,
        "ledger deployed"
    );
    Ok(config)
}
