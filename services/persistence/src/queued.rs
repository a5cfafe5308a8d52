//! Queued durable writer
//!
//! Hot-path operations enqueue a tagged event and return immediately; a
//! background consumer thread drains the queue and applies each event to
//! the [`OrderStore`] strictly in enqueue order. Transient store errors are
//! retried with bounded backoff; an event that keeps failing is logged and
//! skipped so the queue stays live, and the skip count is surfaced as a
//! health signal rather than an error on the matching path.
//!
//! Replay and query operations read the store synchronously, bypassing the
//! queue. `create_instrument` also applies synchronously: book creation is
//! off the hot path and its streams must exist before any order event.

use crate::store::OrderStore;
use crate::writer::{Writer, WriterError, WriterEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};
use types::{InstrumentId, InstrumentRecord, Order, OrderId, PartyId, Trade};

const MAX_APPLY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(10);

enum Command {
    Apply(WriterEvent),
    /// Rendezvous: acked once every prior event has been applied.
    Flush(SyncSender<()>),
    Shutdown,
}

/// Durability health counters, exposed to supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DurableWriterHealth {
    /// Events abandoned after exhausting retries.
    pub dropped_events: u64,
}

/// Asynchronous, non-blocking writer over the durable [`OrderStore`].
pub struct QueuedDurableWriter {
    store: Arc<Mutex<OrderStore>>,
    tx: Sender<Command>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    dropped_events: Arc<AtomicU64>,
}

impl QueuedDurableWriter {
    /// Wrap a store and start the background consumer.
    pub fn new(store: OrderStore) -> Self {
        let store = Arc::new(Mutex::new(store));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let store = Arc::clone(&store);
            let dropped_events = Arc::clone(&dropped_events);
            std::thread::spawn(move || consumer_loop(rx, store, dropped_events))
        };

        Self {
            store,
            tx,
            consumer: Mutex::new(Some(consumer)),
            dropped_events,
        }
    }

    /// Block until every event enqueued so far has been applied.
    pub fn drain(&self) -> Result<(), WriterError> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(0);
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| WriterError::QueueClosed)?;
        ack_rx.recv().map_err(|_| WriterError::QueueClosed)
    }

    pub fn health(&self) -> DurableWriterHealth {
        DurableWriterHealth {
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, event: WriterEvent) -> Result<(), WriterError> {
        self.tx
            .send(Command::Apply(event))
            .map_err(|_| WriterError::QueueClosed)
    }
}

impl Writer for QueuedDurableWriter {
    fn create_instrument(&self, record: &InstrumentRecord) -> Result<(), WriterError> {
        // Synchronous: the caller gets durable streams before the book
        // accepts its first order.
        let mut store = self.store.lock().expect("store lock");
        store.create_instrument(record)?;
        Ok(())
    }

    fn record_order(&self, order: &Order) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Order {
            order: order.clone(),
        })
    }

    fn record_trade(&self, trade: &Trade) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::Trade {
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
        self.enqueue(WriterEvent::Cancel {
            instrument_id,
            order_id,
            party_id,
            timestamp,
        })
    }

    fn upsert_live_order(&self, order: &Order) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::UpsertLive {
            order: order.clone(),
        })
    }

    fn remove_live_order(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::RemoveLive {
            instrument_id,
            order_id,
        })
    }

    fn update_order_quantity(
        &self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    ) -> Result<(), WriterError> {
        self.enqueue(WriterEvent::UpdateLive {
            instrument_id,
            order_id,
            filled_quantity,
            remaining_quantity,
        })
    }

    fn iter_orders(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        Ok(self.store.lock().expect("store lock").orders(instrument_id))
    }

    fn list_instruments(&self) -> Result<Vec<InstrumentRecord>, WriterError> {
        Ok(self.store.lock().expect("store lock").instruments())
    }

    fn live_orders(&self, instrument_id: InstrumentId) -> Result<Vec<Order>, WriterError> {
        Ok(self
            .store
            .lock()
            .expect("store lock")
            .live_orders(instrument_id))
    }

    fn trades(&self, instrument_id: InstrumentId) -> Result<Vec<Trade>, WriterError> {
        Ok(self.store.lock().expect("store lock").trades(instrument_id))
    }

    fn counter_high_water(&self) -> u64 {
        self.store
            .lock()
            .expect("store lock")
            .counter_high_water()
    }

    /// Drain pending events synchronously, then stop the consumer.
    fn shutdown(&self) {
        let handle = self.consumer.lock().expect("consumer lock").take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                error!("durable writer consumer panicked during shutdown");
            }
        }
    }
}

impl Drop for QueuedDurableWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn consumer_loop(
    rx: Receiver<Command>,
    store: Arc<Mutex<OrderStore>>,
    dropped_events: Arc<AtomicU64>,
) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Apply(event) => {
                apply_with_retry(&store, &event, &dropped_events);
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }
    let mut store = store.lock().expect("store lock");
    if let Err(e) = store.sync() {
        error!(error = %e, "store sync failed during shutdown");
    }
    debug!("durable writer consumer stopped");
}

fn apply_with_retry(
    store: &Arc<Mutex<OrderStore>>,
    event: &WriterEvent,
    dropped_events: &AtomicU64,
) {
    for attempt in 1..=MAX_APPLY_ATTEMPTS {
        let result = {
            let mut store = store.lock().expect("store lock");
            apply(&mut store, event)
        };
        match result {
            Ok(()) => return,
            Err(e) if attempt < MAX_APPLY_ATTEMPTS => {
                warn!(kind = event.kind(), attempt, error = %e, "event apply failed; retrying");
                std::thread::sleep(RETRY_BACKOFF_BASE * 2u32.pow(attempt - 1));
            }
            Err(e) => {
                // Poison event: drop it so the queue stays live.
                error!(kind = event.kind(), error = %e, "event apply failed permanently; skipping");
                dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn apply(store: &mut OrderStore, event: &WriterEvent) -> Result<(), crate::store::StoreError> {
    match event {
        WriterEvent::Instrument { record } => store.create_instrument(record),
        WriterEvent::Order { order } => store.record_order(order),
        WriterEvent::Trade { trade } => store.record_trade(trade),
        WriterEvent::Cancel {
            instrument_id,
            order_id,
            ..
        } => store.record_cancel(*instrument_id, *order_id),
        WriterEvent::UpsertLive { order } => store.upsert_live_order(order),
        WriterEvent::RemoveLive {
            instrument_id,
            order_id,
        } => store.remove_live_order(*instrument_id, *order_id),
        WriterEvent::UpdateLive {
            instrument_id,
            order_id,
            filled_quantity,
            remaining_quantity,
        } => store.update_order_quantity(
            *instrument_id,
            *order_id,
            *filled_quantity,
            *remaining_quantity,
        ),
    }
}
