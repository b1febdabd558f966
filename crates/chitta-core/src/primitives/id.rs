//! Node identifiers
//!
//! A node identifier is a 128-bit value generated with strong randomness.
//! Collision probability is negligible at any plausible store size.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 128-bit node identifier, stored as two 64-bit halves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    hi: u64,
    lo: u64,
}

impl NodeId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self::from_u128(Uuid::new_v4().as_u128())
    }

    pub fn from_halves(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    pub fn from_u128(v: u128) -> Self {
        Self {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }

    pub fn as_u128(&self) -> u128 {
        ((self.hi as u128) << 64) | self.lo as u128
    }

    /// High 64 bits
    pub fn hi(&self) -> u64 {
        self.hi
    }

    /// Low 64 bits
    pub fn lo(&self) -> u64 {
        self.lo
    }

    /// The all-zero id, reserved as the "empty hash entry" sentinel.
    /// Never produced by [`NodeId::generate`]-range randomness in practice,
    /// and refused at insert time.
    pub fn zero() -> Self {
        Self { hi: 0, lo: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.as_u128()))
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_u128(Uuid::from_str(s)?.as_u128()))
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = uuid::Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_halves_roundtrip() {
        let id = NodeId::generate();
        let rebuilt = NodeId::from_halves(id.hi(), id.lo());
        assert_eq!(id, rebuilt);
        assert_eq!(id.as_u128(), rebuilt.as_u128());
    }

    #[test]
    fn test_string_roundtrip() {
        let id = NodeId::generate();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_as_string() {
        let id = NodeId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
