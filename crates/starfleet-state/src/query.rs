use std::collections::HashSet;

use starfleet_core::error::StakeError;
use starfleet_core::ledger::{CustodyState, Entitlement};
use starfleet_core::phase::Phase;
use starfleet_core::types::{Balance, Timestamp};

use crate::db::StateDb;

/// Read-only views over a deployed ledger.
pub struct LedgerQuery<'a> {
    db: &'a StateDb,
}

impl<'a> LedgerQuery<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Human-readable summary of the ledger at `now`.
    pub fn describe(&self, now: Timestamp) -> Result<String, StakeError> {
        let cfg = self.db.config()?;
        let totals = self.db.totals()?;
        let phase = cfg.clock.phase_at(now);

        let phase_str = match cfg.clock.secs_until_next_phase(now) {
            Some(secs) => format!("{} ({} days {} hours left)", phase, secs / 86_400, (secs % 86_400) / 3_600),
            None => phase.to_string(),
        };
        let custody_str = match self.db.custody()? {
            CustodyState::Pending => "pending".to_string(),
            CustodyState::Transferred(r) => format!(
                "transferred {} to {} at {} ({} participants archived)",
                r.amount, r.custodian, r.transferred_at, r.participants
            ),
        };
        let minimum = if cfg.thresholds.is_minimum_reached(totals.total_staked) {
            "reached"
        } else {
            "not reached"
        };

        let mut out = String::new();
        out.push_str(&format!("ledger        {}\n", cfg.ledger));
        out.push_str(&format!("token         {}\n", cfg.token));
        out.push_str(&format!("owner         {}\n", self.db.owner()?));
        out.push_str(&format!("phase         {}\n", phase_str));
        out.push_str(&format!("t_zero        {}\n", cfg.clock.t_zero()));
        out.push_str(&format!("boarding end  {}\n", cfg.clock.boarding_period_end()));
        out.push_str(&format!("lock end      {}\n", cfg.clock.lock_period_end()));
        out.push_str(&format!("bridge end    {}\n", cfg.clock.bridge_period_end()));
        out.push_str(&format!(
            "staked        {} (minimum {} {}, cap {})\n",
            totals.total_staked, cfg.thresholds.min_threshold, minimum, cfg.thresholds.max_threshold
        ));
        out.push_str(&format!("participants  {}\n", self.db.participant_count()?));
        out.push_str(&format!("withdrawn     {}\n", totals.withdrawn));
        out.push_str(&format!("bridged       {}\n", totals.bridged_stake));
        out.push_str(&format!("claimed       {}\n", totals.entitlement_paid));
        out.push_str(&format!("custody       {}", custody_str));
        Ok(out)
    }

    /// Check the structural invariants of the stored state. Returns every
    /// violation found; an empty list means the ledger is consistent.
    pub fn check_invariants(&self) -> Result<Vec<String>, StakeError> {
        let mut problems = Vec::new();
        let cfg = self.db.config()?;
        let totals = self.db.totals()?;
        let stakes = self.db.iter_stakes()?;

        let mut sum: Balance = 0;
        for (addr, stake) in &stakes {
            if *stake == 0 {
                problems.push(format!("zero stake stored for {addr}"));
            }
            if *stake >= cfg.thresholds.max_threshold {
                problems.push(format!("stake of {addr} reaches the cap"));
            }
            sum = sum.saturating_add(*stake);
        }
        if sum != totals.total_staked {
            problems.push(format!("sum of stakes {} != total_staked {}", sum, totals.total_staked));
        }

        let count = self.db.participant_count()?;
        let members = self.db.participants()?;
        if members.len() as u64 != count {
            problems.push(format!("{} participant slots but count is {}", members.len(), count));
        }
        let mut seen = HashSet::new();
        for slot in 0..count {
            match self.db.participant_at(slot)? {
                Some(addr) => {
                    if !seen.insert(addr) {
                        problems.push(format!("{addr} appears twice in the participant set"));
                    }
                    if self.db.participant_slot(&addr)? != Some(slot) {
                        problems.push(format!("slot index of {addr} does not point at {slot}"));
                    }
                    if self.db.get_stake(&addr)? == 0 {
                        problems.push(format!("participant {addr} has no stake"));
                    }
                }
                None => problems.push(format!("participant slot {slot} is empty")),
            }
        }
        for (addr, _) in &stakes {
            if !seen.contains(addr) {
                problems.push(format!("staker {addr} missing from the participant set"));
            }
        }

        let mut claimed: Balance = 0;
        for (_, entitlement) in self.db.iter_entitlements()? {
            if let Entitlement::Claimed { amount, .. } = entitlement {
                claimed = claimed.saturating_add(amount);
            }
        }
        if !totals.reconciles(claimed) {
            problems.push(format!(
                "totals do not reconcile: deposited {} vs staked {} + withdrawn {} + bridged {}; paid {} vs claimed {}",
                totals.deposited,
                totals.total_staked,
                totals.withdrawn,
                totals.bridged_stake,
                totals.entitlement_paid,
                claimed
            ));
        }
        if let CustodyState::Transferred(r) = self.db.custody()? {
            if totals.total_staked != 0 {
                problems.push(format!("{} still staked after transfer to {}", totals.total_staked, r.custodian));
            }
        }
        Ok(problems)
    }

    /// Phase the ledger is in at `now`.
    pub fn phase(&self, now: Timestamp) -> Result<Phase, StakeError> {
        Ok(self.db.config()?.clock.phase_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StagedWrites;
    use crate::deploy::deploy;
    use starfleet_core::ledger::LedgerTotals;
    use starfleet_core::params::DeployParams;
    use starfleet_core::types::Address;

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("starfleet_query_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    fn deployed(name: &str) -> StateDb {
        let db = temp_db(name);
        let p = DeployParams::new(
            Address::from_low_u64(0xAA),
            Address::from_low_u64(1),
            Address::from_low_u64(0x70),
            1_000,
        );
        deploy(&db, &p, 1_000).unwrap();
        db
    }

    #[test]
    fn fresh_ledger_is_consistent() {
        let db = deployed("fresh");
        let q = LedgerQuery::new(&db);
        assert!(q.check_invariants().unwrap().is_empty());
        assert_eq!(q.phase(1_000).unwrap(), Phase::Boarding);
        let text = q.describe(1_000).unwrap();
        assert!(text.contains("boarding"));
        assert!(text.contains("custody       pending"));
    }

    #[test]
    fn detects_orphaned_stake() {
        let db = deployed("orphan");
        let a = Address::from_low_u64(3);
        db.commit(&StagedWrites {
            stakes: vec![(a, Some(10))],
            totals: Some(LedgerTotals { total_staked: 10, deposited: 10, ..Default::default() }),
            ..Default::default()
        })
        .unwrap();
        let problems = LedgerQuery::new(&db).check_invariants().unwrap();
        assert_eq!(problems.len(), 1, "{problems:?}");
        assert!(problems[0].contains("missing from the participant set"));
    }

    #[test]
    fn detects_payout_without_claim_record() {
        let db = deployed("payout");
        let a = Address::from_low_u64(7);
        db.commit(&StagedWrites {
            entitlements: vec![(a, Entitlement::Claimed { amount: 30, claimed_at: 1 })],
            totals: Some(LedgerTotals { entitlement_paid: 30, ..Default::default() }),
            ..Default::default()
        })
        .unwrap();
        assert!(LedgerQuery::new(&db).check_invariants().unwrap().is_empty());

        db.commit(&StagedWrites {
            totals: Some(LedgerTotals { entitlement_paid: 55, ..Default::default() }),
            ..Default::default()
        })
        .unwrap();
        let problems = LedgerQuery::new(&db).check_invariants().unwrap();
        assert_eq!(problems.len(), 1, "{problems:?}");
        assert!(problems[0].contains("paid 55 vs claimed 30"));
    }
}
