//! Broadcast writer
//!
//! Publishes order, trade, and cancel events as self-contained JSON
//! payloads over a `tokio::sync::broadcast` channel. Fire-and-forget and
//! lossy by design: a subscriber that lags far enough to be dropped from
//! the channel resynchronizes by rereading durable state. No acks, no
//! retries, no replay participation.

use crate::writer::{Writer, WriterError, WriterEvent};
use tokio::sync::broadcast;
use tracing::trace;
use types::{InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// One-way event publication to an arbitrary number of subscribers.
pub struct BroadcastWriter {
    tx: broadcast::Sender<String>,
}

impl BroadcastWriter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Capacity bounds how far a slow subscriber may lag before it starts
    /// missing packets.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event feed. Each payload is one JSON object with a
    /// `kind` tag.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    fn publish(&self, event: &WriterEvent) -> Result<(), WriterError> {
        let payload =
            serde_json::to_string(event).map_err(|e| WriterError::Serialization(e.to_string()))?;
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(payload);
        trace!(kind = event.kind(), "event broadcast");
        Ok(())
    }
}

impl Default for BroadcastWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer for BroadcastWriter {
    fn create_instrument(&self, record: &InstrumentRecord) -> Result<(), WriterError> {
        self.publish(&WriterEvent::Instrument {
            record: record.clone(),
        })
    }

    fn record_order(&self, order: &Order) -> Result<(), WriterError> {
        self.publish(&WriterEvent::Order {
            order: order.clone(),
        })
    }

    fn record_trade(&self, trade: &Trade) -> Result<(), WriterError> {
        self.publish(&WriterEvent::Trade {
            trade: trade.clone(),
        })
    }

    fn record_cancel(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
        timestamp: i64,
    ) -> Result<(), WriterError> {
        self.publish(&WriterEvent::Cancel {
            instrument_id,
            order_id,
            party_id,
            timestamp,
        })
    }

    // Projection maintenance is a durable-store concern; subscribers derive
    // open-order state from the ORDER/TRADE/CANCEL feed or reread the store.
    fn upsert_live_order(&self, _order: &Order) -> Result<(), WriterError> {
        Ok(())
    }

    fn remove_live_order(
        &self,
        _instrument_id: InstrumentId,
        _order_id: OrderId,
    ) -> Result<(), WriterError> {
        Ok(())
    }

    fn update_order_quantity(
        &self,
        _instrument_id: InstrumentId,
        _order_id: OrderId,
        _filled_quantity: u64,
        _remaining_quantity: u64,
    ) -> Result<(), WriterError> {
        Ok(())
    }
}
