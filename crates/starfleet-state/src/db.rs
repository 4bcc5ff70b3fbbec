use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

use starfleet_core::error::StakeError;
use starfleet_core::event::EventRecord;
use starfleet_core::ledger::{CustodyState, Entitlement, LedgerConfig, LedgerTotals};
use starfleet_core::types::{Address, Balance};

const META_CONFIG: &str = "config";
const META_OWNER: &str = "owner";
const META_TOTALS: &str = "totals";
const META_CUSTODY: &str = "custody";
const META_PARTICIPANT_COUNT: &str = "participant_count";
const META_EVENT_SEQ: &str = "event_seq";

fn storage(e: impl std::fmt::Display) -> StakeError {
    StakeError::Storage(e.to_string())
}

fn ser<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, StakeError> {
    bincode::serialize(v).map_err(|e| StakeError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StakeError> {
    bincode::deserialize(bytes).map_err(|e| StakeError::Serialization(e.to_string()))
}

fn decode_u128(bytes: &[u8]) -> Result<u128, StakeError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StakeError::Serialization(format!("corrupt amount ({} bytes)", bytes.len())))?;
    Ok(u128::from_be_bytes(arr))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StakeError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StakeError::Serialization(format!("corrupt counter ({} bytes)", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_address(bytes: &[u8]) -> Result<Address, StakeError> {
    let arr: [u8; 20] = bytes
        .try_into()
        .map_err(|_| StakeError::Serialization(format!("corrupt address ({} bytes)", bytes.len())))?;
    Ok(Address::from_bytes(arr))
}

// ── Staged writes ─────────────────────────────────────────────────────────────

/// Writes produced by one operation, committed together or not at all.
/// `None` removes the key.
#[derive(Default, Debug)]
pub struct StagedWrites {
    pub stakes: Vec<(Address, Option<Balance>)>,
    pub participants: Vec<(u64, Option<Address>)>,
    pub participant_slots: Vec<(Address, Option<u64>)>,
    pub entitlements: Vec<(Address, Entitlement)>,
    pub bridged_stakes: Vec<(Address, Balance)>,
    pub events: Vec<EventRecord>,
    pub owner: Option<Address>,
    pub totals: Option<LedgerTotals>,
    pub custody: Option<CustodyState>,
    pub participant_count: Option<u64>,
    pub config: Option<LedgerConfig>,
}

/// Pre-encoded form of `StagedWrites` so the transaction body only moves bytes.
struct EncodedWrites {
    stakes: Vec<([u8; 20], Option<[u8; 16]>)>,
    participants: Vec<([u8; 8], Option<[u8; 20]>)>,
    participant_slots: Vec<([u8; 20], Option<[u8; 8]>)>,
    entitlements: Vec<([u8; 20], Vec<u8>)>,
    bridged_stakes: Vec<([u8; 20], [u8; 16])>,
    events: Vec<([u8; 8], Vec<u8>)>,
    meta: Vec<(&'static str, Vec<u8>)>,
}

impl StagedWrites {
    fn encode(&self) -> Result<EncodedWrites, StakeError> {
        let mut meta = Vec::new();
        if let Some(cfg) = &self.config {
            meta.push((META_CONFIG, ser(cfg)?));
        }
        if let Some(owner) = &self.owner {
            meta.push((META_OWNER, owner.as_bytes().to_vec()));
        }
        if let Some(totals) = &self.totals {
            meta.push((META_TOTALS, ser(totals)?));
        }
        if let Some(custody) = &self.custody {
            meta.push((META_CUSTODY, ser(custody)?));
        }
        if let Some(n) = self.participant_count {
            meta.push((META_PARTICIPANT_COUNT, n.to_be_bytes().to_vec()));
        }
        if let Some(last) = self.events.last() {
            meta.push((META_EVENT_SEQ, (last.seq + 1).to_be_bytes().to_vec()));
        }
        Ok(EncodedWrites {
            stakes: self
                .stakes
                .iter()
                .map(|(a, v)| (a.0, v.map(|b| b.to_be_bytes())))
                .collect(),
            participants: self
                .participants
                .iter()
                .map(|(slot, a)| (slot.to_be_bytes(), a.map(|a| a.0)))
                .collect(),
            participant_slots: self
                .participant_slots
                .iter()
                .map(|(a, slot)| (a.0, slot.map(|s| s.to_be_bytes())))
                .collect(),
            entitlements: self
                .entitlements
                .iter()
                .map(|(a, e)| Ok((a.0, ser(e)?)))
                .collect::<Result<_, StakeError>>()?,
            bridged_stakes: self
                .bridged_stakes
                .iter()
                .map(|(a, v)| (a.0, v.to_be_bytes()))
                .collect(),
            events: self
                .events
                .iter()
                .map(|r| Ok((r.seq.to_be_bytes(), ser(r)?)))
                .collect::<Result<_, StakeError>>()?,
            meta,
        })
    }
}

// ── StateDb ───────────────────────────────────────────────────────────────────

/// Persistent ledger state backed by sled (pure-Rust, no C dependencies).
///
/// Named trees (analogous to column families):
///   stakes             — address bytes → u128 BE
///   participants       — slot u64 BE   → address bytes (dense, 0..count)
///   participant_slots  — address bytes → slot u64 BE
///   entitlements       — address bytes → bincode(Entitlement)
///   bridged_stakes     — address bytes → u128 BE (archive written by the bridge)
///   events             — seq u64 BE    → bincode(EventRecord)
///   meta               — utf8 key      → raw bytes / bincode
pub struct StateDb {
    _db: sled::Db,
    stakes: sled::Tree,
    participants: sled::Tree,
    participant_slots: sled::Tree,
    entitlements: sled::Tree,
    bridged_stakes: sled::Tree,
    events: sled::Tree,
    meta: sled::Tree,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StakeError> {
        let db = sled::open(path).map_err(storage)?;
        Self::with_db(db)
    }

    /// Use trees inside an already-open database.
    pub fn with_db(db: sled::Db) -> Result<Self, StakeError> {
        let stakes = db.open_tree("stakes").map_err(storage)?;
        let participants = db.open_tree("participants").map_err(storage)?;
        let participant_slots = db.open_tree("participant_slots").map_err(storage)?;
        let entitlements = db.open_tree("entitlements").map_err(storage)?;
        let bridged_stakes = db.open_tree("bridged_stakes").map_err(storage)?;
        let events = db.open_tree("events").map_err(storage)?;
        let meta = db.open_tree("meta").map_err(storage)?;
        Ok(Self {
            _db: db,
            stakes,
            participants,
            participant_slots,
            entitlements,
            bridged_stakes,
            events,
            meta,
        })
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    fn get_meta(&self, key: &str) -> Result<Option<sled::IVec>, StakeError> {
        self.meta.get(key.as_bytes()).map_err(storage)
    }

    pub fn is_deployed(&self) -> Result<bool, StakeError> {
        self.meta.contains_key(META_CONFIG.as_bytes()).map_err(storage)
    }

    pub fn config(&self) -> Result<LedgerConfig, StakeError> {
        match self.get_meta(META_CONFIG)? {
            Some(bytes) => de(&bytes),
            None => Err(StakeError::NotDeployed),
        }
    }

    pub fn owner(&self) -> Result<Address, StakeError> {
        match self.get_meta(META_OWNER)? {
            Some(bytes) => decode_address(&bytes),
            None => Err(StakeError::NotDeployed),
        }
    }

    pub fn totals(&self) -> Result<LedgerTotals, StakeError> {
        match self.get_meta(META_TOTALS)? {
            Some(bytes) => de(&bytes),
            None => Ok(LedgerTotals::default()),
        }
    }

    pub fn custody(&self) -> Result<CustodyState, StakeError> {
        match self.get_meta(META_CUSTODY)? {
            Some(bytes) => de(&bytes),
            None => Ok(CustodyState::Pending),
        }
    }

    pub fn participant_count(&self) -> Result<u64, StakeError> {
        match self.get_meta(META_PARTICIPANT_COUNT)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    pub fn next_event_seq(&self) -> Result<u64, StakeError> {
        match self.get_meta(META_EVENT_SEQ)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    // ── Stakes ────────────────────────────────────────────────────────────────

    pub fn get_stake(&self, addr: &Address) -> Result<Balance, StakeError> {
        match self.stakes.get(addr.as_bytes()).map_err(storage)? {
            Some(bytes) => decode_u128(&bytes),
            None => Ok(0),
        }
    }

    pub fn iter_stakes(&self) -> Result<Vec<(Address, Balance)>, StakeError> {
        let mut out = Vec::new();
        for item in self.stakes.iter() {
            let (k, v) = item.map_err(storage)?;
            out.push((decode_address(&k)?, decode_u128(&v)?));
        }
        Ok(out)
    }

    pub fn get_bridged_stake(&self, addr: &Address) -> Result<Balance, StakeError> {
        match self.bridged_stakes.get(addr.as_bytes()).map_err(storage)? {
            Some(bytes) => decode_u128(&bytes),
            None => Ok(0),
        }
    }

    // ── Participant set ───────────────────────────────────────────────────────

    pub fn participant_slot(&self, addr: &Address) -> Result<Option<u64>, StakeError> {
        match self.participant_slots.get(addr.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn participant_at(&self, slot: u64) -> Result<Option<Address>, StakeError> {
        match self.participants.get(slot.to_be_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode_address(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Participants in slot order. Slot order is not meaningful.
    pub fn participants(&self) -> Result<Vec<Address>, StakeError> {
        let mut out = Vec::new();
        for item in self.participants.iter() {
            let (_, v) = item.map_err(storage)?;
            out.push(decode_address(&v)?);
        }
        Ok(out)
    }

    // ── Entitlements ──────────────────────────────────────────────────────────

    pub fn get_entitlement(&self, addr: &Address) -> Result<Entitlement, StakeError> {
        match self.entitlements.get(addr.as_bytes()).map_err(storage)? {
            Some(bytes) => de(&bytes),
            None => Ok(Entitlement::Unassigned),
        }
    }

    pub fn iter_entitlements(&self) -> Result<Vec<(Address, Entitlement)>, StakeError> {
        let mut out = Vec::new();
        for item in self.entitlements.iter() {
            let (k, v) = item.map_err(storage)?;
            out.push((decode_address(&k)?, de(&v)?));
        }
        Ok(out)
    }

    // ── Events ────────────────────────────────────────────────────────────────

    pub fn events(&self) -> Result<Vec<EventRecord>, StakeError> {
        let mut out = Vec::new();
        for item in self.events.iter() {
            let (_, v) = item.map_err(storage)?;
            out.push(de(&v)?);
        }
        Ok(out)
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    /// Apply every staged write in one sled transaction across all trees.
    pub fn commit(&self, staged: &StagedWrites) -> Result<(), StakeError> {
        let enc = staged.encode()?;
        let result: Result<(), TransactionError<()>> = (
            &self.stakes,
            &self.participants,
            &self.participant_slots,
            &self.entitlements,
            &self.bridged_stakes,
            &self.events,
            &self.meta,
        )
            .transaction(|(stakes, participants, slots, entitlements, bridged, events, meta)| {
                for (k, v) in &enc.stakes {
                    match v {
                        Some(v) => stakes.insert(&k[..], &v[..])?,
                        None => stakes.remove(&k[..])?,
                    };
                }
                for (k, v) in &enc.participants {
                    match v {
                        Some(v) => participants.insert(&k[..], &v[..])?,
                        None => participants.remove(&k[..])?,
                    };
                }
                for (k, v) in &enc.participant_slots {
                    match v {
                        Some(v) => slots.insert(&k[..], &v[..])?,
                        None => slots.remove(&k[..])?,
                    };
                }
                for (k, v) in &enc.entitlements {
                    entitlements.insert(&k[..], v.as_slice())?;
                }
                for (k, v) in &enc.bridged_stakes {
                    bridged.insert(&k[..], &v[..])?;
                }
                for (k, v) in &enc.events {
                    events.insert(&k[..], v.as_slice())?;
                }
                for (k, v) in &enc.meta {
                    meta.insert(k.as_bytes(), v.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            });
        result.map_err(|e| StakeError::Storage(format!("commit failed: {e:?}")))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), StakeError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}
