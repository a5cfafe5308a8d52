//! Writer contract shared by every event sink
//!
//! Recording operations are called on the matching hot path and must not
//! block: implementations enqueue and return. Replay and query operations
//! are synchronous and only the durable writer answers them; the lossy
//! sinks inherit the empty defaults.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::{InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade};

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("writer queue closed")]
    QueueClosed,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A self-describing event, tagged with its kind so broadcast subscribers
/// and backup readers can decode any payload without prior state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WriterEvent {
    #[serde(rename = "INSTRUMENT")]
    Instrument { record: InstrumentRecord },

    #[serde(rename = "ORDER")]
    Order { order: Order },

    #[serde(rename = "TRADE")]
    Trade { trade: Trade },

    #[serde(rename = "CANCEL")]
    Cancel {
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
        timestamp: i64,
    },

    #[serde(rename = "UPSERT_LIVE")]
    UpsertLive { order: Order },

    #[serde(rename = "REMOVE_LIVE")]
    RemoveLive {
        instrument_id: InstrumentId,
        order_id: OrderId,
    },

    #[serde(rename = "UPDATE_LIVE")]
    UpdateLive {
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    },
}

impl WriterEvent {
    /// Kind tag, used to route backup lines to per-kind files.
    pub fn kind(&self) -> &'static str {
        match self {
            WriterEvent::Instrument { .. } => "INSTRUMENT",
            WriterEvent::Order { .. } => "ORDER",
            WriterEvent::Trade { .. } => "TRADE",
            WriterEvent::Cancel { .. } => "CANCEL",
            WriterEvent::UpsertLive { .. } => "UPSERT_LIVE",
            WriterEvent::RemoveLive { .. } => "REMOVE_LIVE",
            WriterEvent::UpdateLive { .. } => "UPDATE_LIVE",
        }
    }

    /// Instrument the event belongs to; `None` for the global instrument
    /// stream.
    pub fn instrument_id(&self) -> Option<InstrumentId> {
        match self {
            WriterEvent::Instrument { .. } => None,
            WriterEvent::Order { order } | WriterEvent::UpsertLive { order } => {
                Some(order.instrument_id)
            }
            WriterEvent::Trade { trade } => Some(trade.instrument_id),
            WriterEvent::Cancel { instrument_id, .. }
            | WriterEvent::RemoveLive { instrument_id, .. }
            | WriterEvent::UpdateLive { instrument_id, .. } => Some(*instrument_id),
        }
    }
}

/// Uniform sink for exchange events.
///
/// For one `submit_order` call the exchange emits: the taker order
/// snapshot, then trades in execution order, then maker projection
/// updates, then the resting residue upsert. Implementations must keep
/// that order; groups from distinct calls never interleave because the
/// exchange serializes its critical section.
pub trait Writer: Send + Sync {
    /// Persist instrument metadata and create its storage streams.
    fn create_instrument(&self, record: &InstrumentRecord) -> Result<(), WriterError>;

    /// Append a full, immutable order snapshot.
    fn record_order(&self, order: &Order) -> Result<(), WriterError>;

    /// Append a trade.
    fn record_trade(&self, trade: &Trade) -> Result<(), WriterError>;

    /// Record an explicit cancellation.
    fn record_cancel(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
        timestamp: i64,
    ) -> Result<(), WriterError>;

    /// Project the current open state of an order.
    fn upsert_live_order(&self, order: &Order) -> Result<(), WriterError>;

    /// Drop an order from the open-order projection.
    fn remove_live_order(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), WriterError>;

    /// Patch the open-order projection after a partial maker fill.
    fn update_order_quantity(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    ) -> Result<(), WriterError>;

    /// Full order journal ascending by order id. Rebuild only.
    fn iter_orders(&self, _instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        Ok(Vec::new())
    }

    /// Every known instrument. Rebuild only.
    fn list_instruments(&self) -> Result<Vec<InstrumentRecord>, WriterError> {
        Ok(Vec::new())
    }

    /// Open-order projection, ascending by order id.
    fn live_orders(&self, _instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        Ok(Vec::new())
    }

    /// Trade journal in execution order.
    fn trades(&self, _instrument_id: InstrumentId) -> Result<Vec<Trade>, WriterError> {
        Ok(Vec::new())
    }

    /// Persisted upper bound for the order-id counter.
    fn counter_high_water(&self) -> u64 {
        0
    }

    /// Drain pending events and release resources. Idempotent.
    fn shutdown(&self) {}
}
