//! Request and response payloads for the exchange invocation surface
//!
//! Transport layers (HTTP, FIX, direct calls) deserialize into these and
//! map `ExchangeError` variants onto their own status vocabulary. Field
//! validation lives here so no transport can bypass it.

use serde::{Deserialize, Serialize};
use types::{ExchangeError, InstrumentId, OrderId, OrderType, PartyId, Side, Trade};

/// New-order request. `price_cents` is required for GTC and IOC and must
/// be absent for MARKET.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(default)]
    pub price_cents: Option<u64>,
    pub quantity: u64,
    pub party_id: PartyId,
}

impl SubmitOrderRequest {
    /// Field-level validation. Failing here consumes no order id and emits
    /// no writer event.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.quantity == 0 {
            return Err(ExchangeError::InvalidRequest(
                "quantity must be positive".into(),
            ));
        }
        match self.order_type {
            OrderType::Market => {
                if self.price_cents.is_some() {
                    return Err(ExchangeError::InvalidRequest(
                        "market orders must not carry a price".into(),
                    ));
                }
            }
            OrderType::Gtc | OrderType::Ioc => match self.price_cents {
                None => {
                    return Err(ExchangeError::InvalidRequest(
                        "price_cents is required for GTC and IOC orders".into(),
                    ));
                }
                Some(0) => {
                    return Err(ExchangeError::InvalidRequest(
                        "price_cents must be positive".into(),
                    ));
                }
                Some(_) => {}
            },
        }
        Ok(())
    }
}

/// Successful order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub remaining_quantity: u64,
    pub cancelled: bool,
    pub trades: Vec<Trade>,
}

/// Successful cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAccepted {
    pub order_id: OrderId,
}

/// Outcome of a bulk cancel: per-order successes and failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAllOutcome {
    pub instrument_id: InstrumentId,
    pub cancelled_ids: Vec<OrderId>,
    pub failed_ids: Vec<OrderId>,
}
