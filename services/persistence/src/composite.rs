//! Composite writer
//!
//! Fans every recording operation out to an ordered list of writers. The
//! first writer is the primary: its result is surfaced and queries go to
//! it alone. Secondary failures are logged and swallowed so a lossy sink
//! can never affect primary durability.

use crate::writer::{Writer, WriterError};
use std::sync::Arc;
use tracing::warn;
use types::{InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade};

/// Ordered fan-out over a primary writer and any number of secondaries.
pub struct CompositeWriter {
    writers: Vec<Arc<dyn Writer>>,
}

impl CompositeWriter {
    /// # Panics
    /// Panics when given no writers; a composite needs a primary.
    pub fn new(writers: Vec<Arc<dyn Writer>>) -> Self {
        assert!(!writers.is_empty(), "composite writer needs a primary");
        Self { writers }
    }

    fn primary(&self) -> &dyn Writer {
        self.writers[0].as_ref()
    }

    fn fan_out<F>(&self, op: &'static str, call: F) -> Result<(), WriterError>
    where
        F: Fn(&dyn Writer) -> Result<(), WriterError>,
    {
        let result = call(self.primary());
        for writer in &self.writers[1..] {
            if let Err(e) = call(writer.as_ref()) {
                warn!(op, error = %e, "secondary writer failed; continuing");
            }
        }
        result
    }
}

impl Writer for CompositeWriter {
    fn create_instrument(&self, record: &InstrumentRecord) -> Result<(), WriterError> {
        self.fan_out("create_instrument", |w| w.create_instrument(record))
    }

    fn record_order(&self, order: &Order) -> Result<(), WriterError> {
        self.fan_out("record_order", |w| w.record_order(order))
    }

    fn record_trade(&self, trade: &Trade) -> Result<(), WriterError> {
        self.fan_out("record_trade", |w| w.record_trade(trade))
    }

    fn record_cancel(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
        timestamp: i64,
    ) -> Result<(), WriterError> {
        self.fan_out("record_cancel", |w| {
            w.record_cancel(instrument_id, order_id, party_id, timestamp)
        })
    }

    fn upsert_live_order(&self, order: &Order) -> Result<(), WriterError> {
        self.fan_out("upsert_live_order", |w| w.upsert_live_order(order))
    }

    fn remove_live_order(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), WriterError> {
        self.fan_out("remove_live_order", |w| {
            w.remove_live_order(instrument_id, order_id)
        })
    }

    fn update_order_quantity(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    ) -> Result<(), WriterError> {
        self.fan_out("update_order_quantity", |w| {
            w.update_order_quantity(instrument_id, order_id, filled_quantity, remaining_quantity)
        })
    }

    fn iter_orders(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        self.primary().iter_orders(instrument_id)
    }

    fn list_instruments(&self) -> Result<Vec<InstrumentRecord>, WriterError> {
        self.primary().list_instruments()
    }

    fn live_orders(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        self.primary().live_orders(instrument_id)
    }

    fn trades(&self, instrument_id: InstrumentId) -> Result<Vec<Trade>, WriterError> {
        self.primary().trades(instrument_id)
    }

    fn counter_high_water(&self) -> u64 {
        self.primary().counter_high_water()
    }

    fn shutdown(&self) {
        for writer in &self.writers {
            writer.shutdown();
        }
    }
}
