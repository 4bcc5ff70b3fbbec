//! Entitlement snapshot files fed to `starfleet account-startrac`.
//!
//! ```json
//! [
//!   { "address": "0x00000000000000000000000000000000000000a1", "amount": 500 },
//!   { "address": "0x00000000000000000000000000000000000000a2", "amount": 1250 }
//! ]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use starfleet_core::types::{Address, Balance};

#[derive(Debug, Deserialize)]
pub struct SnapshotRow {
    pub address: Address,
    pub amount: Balance,
}

/// Split parsed rows into the parallel lists the engine takes.
pub fn parse(json: &str) -> anyhow::Result<(Vec<Address>, Vec<Balance>)> {
    let rows: Vec<SnapshotRow> = serde_json::from_str(json).context("parsing snapshot JSON")?;
    Ok(rows.into_iter().map(|r| (r.address, r.amount)).unzip())
}

pub fn load(path: &Path) -> anyhow::Result<(Vec<Address>, Vec<Balance>)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot from {}", path.display()))?;
    parse(&json)
}
