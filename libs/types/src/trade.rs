//! Trade records emitted by matching
//!
//! A trade is immutable once constructed. The price is always the maker's
//! price; the remaining quantities are captured after the fill is applied
//! to both sides.

use crate::ids::{InstrumentId, OrderId, PartyId};
use serde::{Deserialize, Serialize};

/// One fill between a resting maker order and an incoming taker order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument_id: InstrumentId,
    pub price_cents: u64,
    pub quantity: u64,
    /// Execution instant, Unix nanos
    pub timestamp: i64,
    pub maker_order_id: OrderId,
    pub maker_party_id: PartyId,
    pub taker_order_id: OrderId,
    pub taker_party_id: PartyId,
    pub maker_is_buyer: bool,
    pub maker_quantity_remaining: u64,
    pub taker_quantity_remaining: u64,
}
