//! Order lifecycle types
//!
//! An order is created by the exchange with an assigned id and mutated only
//! by its owning book: `fill` during matching, `cancel` on explicit
//! cancellation or unfillable residue. Quantity accounting is checked on
//! every transition.

use crate::ids::{InstrumentId, OrderId, PartyId};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// How an order interacts with resting liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Match at any price against best available liquidity; never rests,
    /// residue is cancelled on exhaustion
    Market,
    /// Good-till-cancelled: match immediately, rest any residue
    Gtc,
    /// Immediate-or-cancel: match immediately, cancel any residue
    Ioc,
}

/// An order as tracked by the book and journaled by the writers
///
/// `quantity` is the original submitted amount and never changes;
/// `filled_quantity + remaining_quantity == quantity` at all times.
/// Market orders carry `price_cents == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub price_cents: u64,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    pub cancelled: bool,
    pub party_id: PartyId,
    /// Submission instant, Unix nanos
    pub timestamp: i64,
}

impl Order {
    /// Create a new open order with no fills
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        instrument_id: InstrumentId,
        side: Side,
        order_type: OrderType,
        price_cents: u64,
        quantity: u64,
        party_id: PartyId,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id,
            instrument_id,
            side,
            order_type,
            price_cents,
            quantity,
            filled_quantity: 0,
            remaining_quantity: quantity,
            cancelled: false,
            party_id,
            timestamp,
        }
    }

    /// Check quantity accounting: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity + self.remaining_quantity == self.quantity
    }

    /// Whether the order has been completely filled
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity == 0
    }

    /// Whether the order is live: unfilled quantity remains and it has not
    /// been cancelled
    pub fn is_live(&self) -> bool {
        self.remaining_quantity > 0 && !self.cancelled
    }

    /// Apply a fill to this order
    ///
    /// # Panics
    /// Panics if the fill is zero, exceeds the remaining quantity, or is
    /// applied to a cancelled order. Those are matching bugs, not inputs.
    pub fn fill(&mut self, quantity: u64) {
        assert!(quantity > 0, "fill quantity must be positive");
        assert!(!self.cancelled, "cannot fill a cancelled order");
        assert!(
            quantity <= self.remaining_quantity,
            "fill {} exceeds remaining {}",
            quantity,
            self.remaining_quantity
        );
        self.filled_quantity += quantity;
        self.remaining_quantity -= quantity;
        debug_assert!(self.check_invariant());
    }

    /// Cancel the unfilled residue
    ///
    /// The flag is sticky and the remaining quantity is kept, so a
    /// cancelled order still reports how much never traded.
    ///
    /// # Panics
    /// Panics when called on a fully filled order: filled orders are
    /// terminal and never marked cancelled.
    pub fn cancel(&mut self) {
        assert!(
            self.remaining_quantity > 0,
            "cannot cancel a fully filled order"
        );
        self.cancelled = true;
    }
}
