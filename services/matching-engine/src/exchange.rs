//! Multi-instrument exchange façade
//!
//! Owns the order books, the monotonic order-id counter, and the single
//! composite writer. Every mutating call runs inside one critical section,
//! which serializes matching and guarantees that the event groups emitted
//! for distinct calls never interleave downstream. Writer calls made
//! inside the critical section only enqueue, so nothing blocks on I/O
//! while a book is locked.

use crate::order_book::OrderBook;
use crate::requests::{CancelAccepted, CancelAllOutcome, OrderAccepted, SubmitOrderRequest};
use persistence::{CompositeWriter, Writer, WriterError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use types::time::now_nanos;
use types::{
    ExchangeError, InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade,
};

/// The authoritative matching process: all books, one id counter, one
/// writer fan-out.
pub struct Exchange {
    books: Mutex<HashMap<InstrumentId, OrderBook>>,
    next_order_id: AtomicU64,
    writer: CompositeWriter,
}

impl Exchange {
    /// Fresh exchange with no books. Use [`Exchange::recover`] when durable
    /// state may exist.
    pub fn new(writer: CompositeWriter) -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            next_order_id: AtomicU64::new(1),
            writer,
        }
    }

    /// Build an exchange and rebuild every book from the durable journal
    /// before any request is served.
    pub fn recover(writer: CompositeWriter) -> Result<Self, ExchangeError> {
        let exchange = Self::new(writer);
        exchange.rebuild()?;
        Ok(exchange)
    }

    /// Reconstruct book state from the full order journals.
    ///
    /// For every known instrument the journal is streamed in ascending
    /// order-id order; snapshots that are cancelled or fully filled are
    /// skipped and the rest are rested with their original ids and
    /// timestamps, emitting no writer events. The id counter advances past
    /// every id seen in any journal and past the persisted counter
    /// high-water mark, so replay can never reissue an id. Running rebuild
    /// twice over the same journal yields identical books.
    pub fn rebuild(&self) -> Result<(), ExchangeError> {
        let mut books = self.books.lock().expect("books lock");
        let instruments = self.writer.list_instruments().map_err(storage_error)?;
        let mut next_id = self
            .next_order_id
            .load(Ordering::SeqCst)
            .max(self.writer.counter_high_water())
            .max(1);

        info!(instruments = instruments.len(), "rebuild starting");
        for record in instruments {
            let instrument_id = record.instrument_id;
            let mut book = OrderBook::new(instrument_id);
            let mut restored = 0usize;
            for order in self.writer.iter_orders(instrument_id).map_err(storage_error)? {
                next_id = next_id.max(order.order_id.as_u64() + 1);
                if order.cancelled || order.remaining_quantity == 0 {
                    continue;
                }
                book.rest_order(order);
                restored += 1;
            }
            info!(instrument = %instrument_id, restored, "book rebuilt");
            books.insert(instrument_id, book);
        }

        self.next_order_id.store(next_id, Ordering::SeqCst);
        info!(next_order_id = next_id, "rebuild complete");
        Ok(())
    }

    /// Create a new instrument and its empty book.
    ///
    /// The instrument record and its storage streams are durable before
    /// the call returns success.
    pub fn create_book(
        &self,
        instrument_id: InstrumentId,
        name: &str,
        description: &str,
        admin_party_id: PartyId,
    ) -> Result<InstrumentRecord, ExchangeError> {
        let mut books = self.books.lock().expect("books lock");
        if books.contains_key(&instrument_id) {
            return Err(ExchangeError::InstrumentExists(instrument_id));
        }

        let record = InstrumentRecord {
            instrument_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: now_nanos(),
            created_by: admin_party_id,
        };
        self.writer
            .create_instrument(&record)
            .map_err(storage_error)?;
        books.insert(instrument_id, OrderBook::new(instrument_id));
        info!(instrument = %instrument_id, name, "book created");
        Ok(record)
    }

    /// Validate, sequence, and match one order, then fan out the resulting
    /// events: taker snapshot, trades in execution order, maker projection
    /// updates, and the resting residue if any.
    pub fn submit_order(
        &self,
        request: &SubmitOrderRequest,
    ) -> Result<OrderAccepted, ExchangeError> {
        request.validate()?;

        let mut books = self.books.lock().expect("books lock");
        let book = books
            .get_mut(&request.instrument_id)
            .ok_or(ExchangeError::UnknownInstrument(request.instrument_id))?;

        // The id is allocated inside the critical section, so id order is
        // submission order for every book.
        let order_id = OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let mut order = Order::new(
            order_id,
            request.instrument_id,
            request.side,
            request.order_type,
            request.price_cents.unwrap_or(0),
            request.quantity,
            request.party_id,
            now_nanos(),
        );

        let outcome = book.submit(&mut order);

        self.emit("record_order", self.writer.record_order(&order));
        for trade in &outcome.trades {
            self.emit("record_trade", self.writer.record_trade(trade));
        }
        for maker in &outcome.maker_updates {
            // Amend the maker's journal snapshot so replaying the journal
            // alone reproduces the fill, then patch or drop its projection.
            self.emit("record_order", self.writer.record_order(maker));
            if maker.remaining_quantity == 0 {
                self.emit(
                    "remove_live_order",
                    self.writer
                        .remove_live_order(maker.instrument_id, maker.order_id),
                );
            } else {
                self.emit(
                    "update_order_quantity",
                    self.writer.update_order_quantity(
                        maker.instrument_id,
                        maker.order_id,
                        maker.filled_quantity,
                        maker.remaining_quantity,
                    ),
                );
            }
        }
        if book.contains(order_id) {
            self.emit("upsert_live_order", self.writer.upsert_live_order(&order));
        }

        info!(order_id = %order_id, instrument = %request.instrument_id,
            trades = outcome.trades.len(), remaining = order.remaining_quantity,
            cancelled = order.cancelled, "order accepted");
        Ok(OrderAccepted {
            order_id,
            remaining_quantity: order.remaining_quantity,
            cancelled: order.cancelled,
            trades: outcome.trades,
        })
    }

    /// Cancel one open order on behalf of its owner.
    ///
    /// A cancel for an unknown, filled, already-cancelled, or
    /// foreign-party order uniformly reports `OrderNotOpen`, so a probe
    /// cannot learn whether another party's order exists.
    pub fn cancel_order(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
    ) -> Result<CancelAccepted, ExchangeError> {
        let mut books = self.books.lock().expect("books lock");
        let book = books
            .get_mut(&instrument_id)
            .ok_or(ExchangeError::UnknownInstrument(instrument_id))?;
        self.cancel_in_book(book, instrument_id, order_id, party_id)
    }

    /// Cancel every open order the party has on the instrument.
    ///
    /// The open-order set is snapshotted under the book lock, which is
    /// then released between the per-order cancels, so fills from other
    /// callers can land mid-operation. An id that stops being open before
    /// its turn lands in `failed_ids`.
    pub fn cancel_all_for_party(
        &self,
        instrument_id: InstrumentId,
        party_id: PartyId,
    ) -> Result<CancelAllOutcome, ExchangeError> {
        let ids = {
            let books = self.books.lock().expect("books lock");
            let book = books
                .get(&instrument_id)
                .ok_or(ExchangeError::UnknownInstrument(instrument_id))?;
            book.order_ids_for_party(party_id)
        };

        let mut cancelled_ids = Vec::new();
        let mut failed_ids = Vec::new();
        for order_id in ids {
            match self.cancel_order(instrument_id, order_id, party_id) {
                Ok(_) => cancelled_ids.push(order_id),
                Err(_) => failed_ids.push(order_id),
            }
        }
        info!(instrument = %instrument_id, party = %party_id,
            cancelled = cancelled_ids.len(), failed = failed_ids.len(),
            "cancel-all complete");
        Ok(CancelAllOutcome {
            instrument_id,
            cancelled_ids,
            failed_ids,
        })
    }

    /// Every known instrument, from the durable projection.
    pub fn list_instruments(&self) -> Result<Vec<InstrumentRecord>, ExchangeError> {
        self.writer.list_instruments().map_err(storage_error)
    }

    /// Full order history for an instrument, ascending by order id.
    pub fn order_history(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, ExchangeError> {
        self.require_instrument(instrument_id)?;
        self.writer.iter_orders(instrument_id).map_err(storage_error)
    }

    /// Open orders for an instrument, from the durable projection.
    pub fn live_orders(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, ExchangeError> {
        self.require_instrument(instrument_id)?;
        self.writer.live_orders(instrument_id).map_err(storage_error)
    }

    /// Trades for an instrument in execution order.
    pub fn trade_history(&self, instrument_id: InstrumentId) -> Result<Vec<Trade>, ExchangeError> {
        self.require_instrument(instrument_id)?;
        self.writer.trades(instrument_id).map_err(storage_error)
    }

    /// Best bid and ask for an instrument.
    pub fn top_of_book(
        &self,
        instrument_id: InstrumentId,
    ) -> Result<(Option<u64>, Option<u64>), ExchangeError> {
        let mut books = self.books.lock().expect("books lock");
        let book = books
            .get_mut(&instrument_id)
            .ok_or(ExchangeError::UnknownInstrument(instrument_id))?;
        Ok((book.best_bid(), book.best_ask()))
    }

    /// Next order id the counter would assign.
    pub fn next_order_id(&self) -> u64 {
        self.next_order_id.load(Ordering::SeqCst)
    }

    /// Quiesce and drain: no new requests should be in flight, then the
    /// writers flush their queues.
    pub fn shutdown(&self) {
        info!("exchange shutting down; draining writers");
        self.writer.shutdown();
    }

    fn cancel_in_book(
        &self,
        book: &mut OrderBook,
        instrument_id: InstrumentId,
        order_id: OrderId,
        party_id: PartyId,
    ) -> Result<CancelAccepted, ExchangeError> {
        let Some(existing) = book.get(order_id) else {
            return Err(ExchangeError::OrderNotOpen(order_id));
        };
        if existing.party_id != party_id {
            debug!(order_id = %order_id, party = %party_id, "cancel by non-owner refused");
            return Err(ExchangeError::OrderNotOpen(order_id));
        }
        let mut snapshot = existing.clone();

        if !book.cancel(order_id) {
            return Err(ExchangeError::OrderNotOpen(order_id));
        }
        snapshot.cancel();

        let timestamp = now_nanos();
        self.emit(
            "record_cancel",
            self.writer
                .record_cancel(instrument_id, order_id, party_id, timestamp),
        );
        self.emit(
            "remove_live_order",
            self.writer.remove_live_order(instrument_id, order_id),
        );
        // Amend the journal so replay sees the order as closed.
        self.emit("record_order", self.writer.record_order(&snapshot));

        info!(order_id = %order_id, instrument = %instrument_id, "order cancelled");
        Ok(CancelAccepted { order_id })
    }

    fn require_instrument(&self, instrument_id: InstrumentId) -> Result<(), ExchangeError> {
        let books = self.books.lock().expect("books lock");
        if books.contains_key(&instrument_id) {
            Ok(())
        } else {
            Err(ExchangeError::UnknownInstrument(instrument_id))
        }
    }

    /// Hot-path writer failures degrade durability, not matching: they are
    /// logged and surfaced through the durable writer's health counters.
    fn emit(&self, op: &'static str, result: Result<(), WriterError>) {
        if let Err(e) = result {
            warn!(op, error = %e, "writer emit failed");
        }
    }
}

fn storage_error(e: WriterError) -> ExchangeError {
    ExchangeError::Storage(e.to_string())
}
