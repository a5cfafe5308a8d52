//! Identifier types for exchange entities
//!
//! All ids are `u64` newtype wrappers. Order ids are allocated by the
//! exchange from a single monotonic counter, so ordering by id is ordering
//! by acceptance; instrument and party ids are assigned externally.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an order
///
/// Strictly increasing across the process lifetime and across restarts:
/// recovery seeds the counter past the highest id ever journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl OrderId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an instrument (one order book per instrument)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u64);

impl InstrumentId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for the party that owns an order
///
/// The engine trusts its caller for party ids; credential checks live in
/// the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub u64);

impl PartyId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_ordering_follows_u64() {
        assert!(OrderId(1) < OrderId(2));
        assert!(OrderId(100) > OrderId(99));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&OrderId(42)).unwrap();
        assert_eq!(json, "42");
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderId(42));
    }

    #[test]
    fn test_display() {
        assert_eq!(InstrumentId(7).to_string(), "7");
        assert_eq!(PartyId(9).to_string(), "9");
    }
}
