//! Fixed-size 32-byte values (POI digests, block hashes, dispute ids) and block references.

use crate::chain::normalize::NormalizeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes32([u8; 32]);

impl Bytes32 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse `0x`-prefixed (or bare) 64-digit hex, case-insensitive.
    pub fn parse_hex(s: &str) -> Result<Self, NormalizeError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = hex::decode(digits).map_err(|_| NormalizeError::InvalidHex(s.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| NormalizeError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Bytes32 {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({})", self.to_hex())
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Block number plus hash; the pair the trusted source needs to locate a POI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: Bytes32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parse_accepts_prefix_and_case() {
        let lower = format!("0x{}", "ab".repeat(32));
        let upper = "AB".repeat(32);
        assert_eq!(
            Bytes32::parse_hex(&lower).unwrap(),
            Bytes32::parse_hex(&upper).unwrap()
        );
        assert_eq!(Bytes32::parse_hex(&upper).unwrap().to_hex(), lower);
    }

    #[test]
    fn hex_parse_rejects_wrong_length() {
        assert!(Bytes32::parse_hex("0x1234").is_err());
        assert!(Bytes32::parse_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn serde_as_hex_string() {
        let v = Bytes32::new([7u8; 32]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "07".repeat(32)));
        let back: Bytes32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
