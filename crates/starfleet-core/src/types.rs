use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Token amount in base units (1 TRAC = 10^18 units). u128 holds the
/// 100M TRAC cap with room to spare.
pub type Balance = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── Address ──────────────────────────────────────────────────────────────────

/// 20-byte account or contract address, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The null address. Never a valid owner, custodian or contributor.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Deterministic test/dev address with `n` in its low eight bytes.
    pub fn from_low_u64(n: u64) -> Self {
        let mut arr = [0u8; 20];
        arr[12..].copy_from_slice(&n.to_be_bytes());
        Self(arr)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(body).map_err(|e| AddressParseError::Hex(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(AddressParseError::Length(bytes.len()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.to_hex();
        write!(f, "Address({}…{})", &h[..6], &h[h.len() - 4..])
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; 20]>::deserialize(deserializer)?;
            Ok(Address(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_accepts_prefix_and_bare() {
        let a = Address::from_low_u64(0xdead_beef);
        assert_eq!(Address::from_hex(&a.to_hex()).unwrap(), a);
        assert_eq!(Address::from_hex(&a.to_hex()[2..]).unwrap(), a);
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            Address::from_hex("0x1234"),
            Err(AddressParseError::Length(2))
        );
        assert!(matches!(Address::from_hex("0xzz"), Err(AddressParseError::Hex(_))));
    }

    #[test]
    fn zero_address_is_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_low_u64(1).is_zero());
    }

    #[test]
    fn json_uses_hex_string() {
        let a = Address::from_low_u64(7);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
