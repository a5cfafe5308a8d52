//! Durable order store
//!
//! One directory holds a global instrument stream, a counter high-water
//! file, and three framed logs per instrument:
//!
//! * `orders_<id>.log`: full order journal; one snapshot per mutation,
//!   latest snapshot per order id wins (upsert semantics).
//! * `live_<id>.log`: event log for the open-order projection.
//! * `trades_<id>.log`: trade journal in execution order.
//!
//! On open every log is folded into in-memory maps, which then serve all
//! synchronous reads; appends go straight to the logs. The fold is what
//! makes rebuild idempotent: replaying the same prefix produces the same
//! maps.

use crate::frame::{read_records, FrameError, FrameWriter, FsyncPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use types::{InstrumentId, InstrumentRecord, Order, OrderId, Trade};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt counter file: {0}")]
    CorruptCounter(String),
}

/// Store configuration with defaults suitable for tests and small
/// deployments; production tunes the fsync policy down.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for all log files; created if absent.
    pub dir: PathBuf,
    /// Fsync discipline for every log.
    pub fsync_policy: FsyncPolicy,
    /// Persist the order-id high-water mark every N recorded orders.
    pub counter_flush_interval: u64,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fsync_policy: FsyncPolicy::EveryWrite,
            counter_flush_interval: 32,
        }
    }
}

/// Mutation of the open-order projection, as journaled in `live_<id>.log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LiveEvent {
    Upsert(Order),
    Remove(OrderId),
    Patch {
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    },
}

/// Logs and projections for one instrument.
struct InstrumentStreams {
    orders: BTreeMap<OrderId, Order>,
    live: BTreeMap<OrderId, Order>,
    trades: Vec<Trade>,
    order_log: FrameWriter,
    live_log: FrameWriter,
    trade_log: FrameWriter,
}

/// File-backed store for orders, trades, live projections, instruments,
/// and the order-id counter.
pub struct OrderStore {
    config: StoreConfig,
    instruments: Vec<InstrumentRecord>,
    instrument_log: FrameWriter,
    streams: HashMap<InstrumentId, InstrumentStreams>,
    counter_high_water: u64,
    orders_since_counter_flush: u64,
}

impl OrderStore {
    /// Open the store, replaying every log into memory.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.dir)?;

        let instrument_path = config.dir.join("instruments.log");
        let instruments: Vec<InstrumentRecord> = read_records(&instrument_path)?;
        let instrument_log = FrameWriter::open(&instrument_path, config.fsync_policy)?;

        let counter_high_water = read_counter(&config.dir.join("counter"))?;

        let mut store = Self {
            config,
            instruments,
            instrument_log,
            streams: HashMap::new(),
            counter_high_water,
            orders_since_counter_flush: 0,
        };

        let known: Vec<InstrumentId> = store
            .instruments
            .iter()
            .map(|r| r.instrument_id)
            .collect();
        for instrument_id in known {
            store.open_streams(instrument_id)?;
        }

        info!(
            instruments = store.instruments.len(),
            counter = store.counter_high_water,
            "store opened"
        );
        Ok(store)
    }

    /// Register a new instrument and create its streams. Re-registering a
    /// known instrument is a no-op, so replayed creates are harmless.
    pub fn create_instrument(&mut self, record: &InstrumentRecord) -> Result<(), StoreError> {
        if self
            .instruments
            .iter()
            .any(|r| r.instrument_id == record.instrument_id)
        {
            return Ok(());
        }
        self.instrument_log.append(record)?;
        self.instruments.push(record.clone());
        self.open_streams(record.instrument_id)?;
        debug!(instrument = %record.instrument_id, "instrument stream created");
        Ok(())
    }

    /// Append a full order snapshot. Later snapshots of the same order id
    /// replace earlier ones in the folded journal view.
    pub fn record_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let streams = self.streams_mut(order.instrument_id)?;
        streams.order_log.append(order)?;
        streams.orders.insert(order.order_id, order.clone());

        if order.order_id.as_u64() >= self.counter_high_water {
            self.counter_high_water = order.order_id.as_u64() + 1;
        }
        self.orders_since_counter_flush += 1;
        if self.orders_since_counter_flush >= self.config.counter_flush_interval {
            self.flush_counter()?;
        }
        Ok(())
    }

    pub fn record_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        let streams = self.streams_mut(trade.instrument_id)?;
        streams.trade_log.append(trade)?;
        streams.trades.push(trade.clone());
        Ok(())
    }

    /// Drop a cancelled order from the open-order projection. The cancelled
    /// journal snapshot arrives separately through [`Self::record_order`].
    pub fn record_cancel(
        &mut self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), StoreError> {
        self.remove_live_order(instrument_id, order_id)
    }

    pub fn upsert_live_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let streams = self.streams_mut(order.instrument_id)?;
        streams.live_log.append(&LiveEvent::Upsert(order.clone()))?;
        streams.live.insert(order.order_id, order.clone());
        Ok(())
    }

    pub fn remove_live_order(
        &mut self,
        instrument_id: InstrumentId,
        order_id: OrderId,
    ) -> Result<(), StoreError> {
        let streams = self.streams_mut(instrument_id)?;
        streams.live_log.append(&LiveEvent::Remove(order_id))?;
        streams.live.remove(&order_id);
        Ok(())
    }

    pub fn update_order_quantity(
        &mut self,
        instrument_id: InstrumentId,
        order_id: OrderId,
        filled_quantity: u64,
        remaining_quantity: u64,
    ) -> Result<(), StoreError> {
        let streams = self.streams_mut(instrument_id)?;
        streams.live_log.append(&LiveEvent::Patch {
            order_id,
            filled_quantity,
            remaining_quantity,
        })?;
        if let Some(order) = streams.live.get_mut(&order_id) {
            order.filled_quantity = filled_quantity;
            order.remaining_quantity = remaining_quantity;
        }
        Ok(())
    }

    /// Latest snapshot of every journaled order, ascending by order id.
    pub fn orders(&self, instrument_id: InstrumentId) -> Vec<Order> {
        self.streams
            .get(&instrument_id)
            .map(|s| s.orders.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Open orders, ascending by order id.
    pub fn live_orders(&self, instrument_id: InstrumentId) -> Vec<Order> {
        self.streams
            .get(&instrument_id)
            .map(|s| s.live.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Trades in execution order.
    pub fn trades(&self, instrument_id: InstrumentId) -> Vec<Trade> {
        self.streams
            .get(&instrument_id)
            .map(|s| s.trades.clone())
            .unwrap_or_default()
    }

    pub fn instruments(&self) -> Vec<InstrumentRecord> {
        self.instruments.clone()
    }

    /// Upper bound on every order id ever recorded, persisted in batches so
    /// a crash between journal append and counter flush can only leave the
    /// counter low, never high; recovery takes the max of both sources.
    pub fn counter_high_water(&self) -> u64 {
        self.counter_high_water
    }

    /// Flush the counter and fsync every log. Called on drain/shutdown.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.flush_counter()?;
        self.instrument_log.sync()?;
        for streams in self.streams.values_mut() {
            streams.order_log.sync()?;
            streams.live_log.sync()?;
            streams.trade_log.sync()?;
        }
        Ok(())
    }

    fn flush_counter(&mut self) -> Result<(), StoreError> {
        std::fs::write(
            self.config.dir.join("counter"),
            self.counter_high_water.to_string(),
        )?;
        self.orders_since_counter_flush = 0;
        Ok(())
    }

    fn streams_mut(
        &mut self,
        instrument_id: InstrumentId,
    ) -> Result<&mut InstrumentStreams, StoreError> {
        if !self.streams.contains_key(&instrument_id) {
            // Orders can arrive for instruments registered in a previous
            // process; open the streams on demand.
            self.open_streams(instrument_id)?;
        }
        Ok(self
            .streams
            .get_mut(&instrument_id)
            .expect("streams opened above"))
    }

    fn open_streams(&mut self, instrument_id: InstrumentId) -> Result<(), StoreError> {
        if self.streams.contains_key(&instrument_id) {
            return Ok(());
        }
        let dir = &self.config.dir;
        let order_path = dir.join(format!("orders_{}.log", instrument_id));
        let live_path = dir.join(format!("live_{}.log", instrument_id));
        let trade_path = dir.join(format!("trades_{}.log", instrument_id));

        let mut orders = BTreeMap::new();
        for order in read_records::<Order>(&order_path)? {
            if order.order_id.as_u64() >= self.counter_high_water {
                self.counter_high_water = order.order_id.as_u64() + 1;
            }
            orders.insert(order.order_id, order);
        }

        let mut live = BTreeMap::new();
        for event in read_records::<LiveEvent>(&live_path)? {
            match event {
                LiveEvent::Upsert(order) => {
                    live.insert(order.order_id, order);
                }
                LiveEvent::Remove(order_id) => {
                    live.remove(&order_id);
                }
                LiveEvent::Patch {
                    order_id,
                    filled_quantity,
                    remaining_quantity,
                } => {
                    if let Some(order) = live.get_mut(&order_id) {
                        order.filled_quantity = filled_quantity;
                        order.remaining_quantity = remaining_quantity;
                    }
                }
            }
        }

        let trades = read_records::<Trade>(&trade_path)?;

        let fsync = self.config.fsync_policy;
        self.streams.insert(
            instrument_id,
            InstrumentStreams {
                orders,
                live,
                trades,
                order_log: FrameWriter::open(order_path, fsync)?,
                live_log: FrameWriter::open(live_path, fsync)?,
                trade_log: FrameWriter::open(trade_path, fsync)?,
            },
        );
        Ok(())
    }
}

fn read_counter(path: &Path) -> Result<u64, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| StoreError::CorruptCounter(e.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::{OrderType, PartyId, Side};

    fn record(instrument_id: u64) -> InstrumentRecord {
        InstrumentRecord {
            instrument_id: InstrumentId(instrument_id),
            name: format!("INST-{}", instrument_id),
            description: "test instrument".into(),
            created_at: 1_700_000_000_000_000_000,
            created_by: PartyId(1),
        }
    }

    fn order(order_id: u64, quantity: u64) -> Order {
        Order::new(
            OrderId(order_id),
            InstrumentId(100),
            Side::Buy,
            OrderType::Gtc,
            10_000,
            quantity,
            PartyId(7),
            1_700_000_000_000_000_000,
        )
    }

    fn trade(quantity: u64) -> Trade {
        Trade {
            instrument_id: InstrumentId(100),
            price_cents: 10_000,
            quantity,
            timestamp: 1_700_000_000_000_000_000,
            maker_order_id: OrderId(1),
            maker_party_id: PartyId(7),
            taker_order_id: OrderId(2),
            taker_party_id: PartyId(8),
            maker_is_buyer: true,
            maker_quantity_remaining: 0,
            taker_quantity_remaining: 0,
        }
    }

    #[test]
    fn test_create_instrument_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();

        store.create_instrument(&record(100)).unwrap();
        store.create_instrument(&record(100)).unwrap();

        assert_eq!(store.instruments().len(), 1);
    }

    #[test]
    fn test_order_journal_upserts_by_id() {
        let tmp = TempDir::new().unwrap();
        let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        store.create_instrument(&record(100)).unwrap();

        let mut o = order(1, 5);
        store.record_order(&o).unwrap();
        o.fill(2);
        store.record_order(&o).unwrap();

        let orders = store.orders(InstrumentId(100));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].filled_quantity, 2);
        assert_eq!(orders[0].remaining_quantity, 3);
    }

    #[test]
    fn test_orders_sorted_ascending_by_id() {
        let tmp = TempDir::new().unwrap();
        let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        store.create_instrument(&record(100)).unwrap();

        for id in [5u64, 1, 3, 2, 4] {
            store.record_order(&order(id, 1)).unwrap();
        }
        let ids: Vec<u64> = store
            .orders(InstrumentId(100))
            .iter()
            .map(|o| o.order_id.as_u64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_live_projection_upsert_patch_remove() {
        let tmp = TempDir::new().unwrap();
        let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        store.create_instrument(&record(100)).unwrap();

        store.upsert_live_order(&order(1, 5)).unwrap();
        store
            .update_order_quantity(InstrumentId(100), OrderId(1), 2, 3)
            .unwrap();

        let live = store.live_orders(InstrumentId(100));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].remaining_quantity, 3);

        store
            .remove_live_order(InstrumentId(100), OrderId(1))
            .unwrap();
        assert!(store.live_orders(InstrumentId(100)).is_empty());
    }

    #[test]
    fn test_reopen_restores_state() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
            store.create_instrument(&record(100)).unwrap();
            store.record_order(&order(1, 5)).unwrap();
            store.record_order(&order(2, 7)).unwrap();
            store.record_trade(&trade(3)).unwrap();
            store.upsert_live_order(&order(1, 5)).unwrap();
            store.sync().unwrap();
        }

        let store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        assert_eq!(store.instruments().len(), 1);
        assert_eq!(store.orders(InstrumentId(100)).len(), 2);
        assert_eq!(store.trades(InstrumentId(100)).len(), 1);
        assert_eq!(store.live_orders(InstrumentId(100)).len(), 1);
        assert_eq!(store.counter_high_water(), 3);
    }

    #[test]
    fn test_counter_survives_restart_even_without_flush() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
            store.create_instrument(&record(100)).unwrap();
            // Fewer orders than the flush interval: the counter file may be
            // stale, but the journal itself restores the high-water mark.
            store.record_order(&order(9, 1)).unwrap();
        }

        let store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        assert_eq!(store.counter_high_water(), 10);
    }

    #[test]
    fn test_unknown_instrument_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = OrderStore::open(StoreConfig::new(tmp.path())).unwrap();
        assert!(store.orders(InstrumentId(42)).is_empty());
        assert!(store.live_orders(InstrumentId(42)).is_empty());
        assert!(store.trades(InstrumentId(42)).is_empty());
    }
}
