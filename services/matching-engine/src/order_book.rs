//! Single-instrument order book with price-time priority matching
//!
//! Two sides, each a price→level map plus a price heap; a single order map
//! owns every resting order, with levels and heaps holding only ids and
//! prices. Matching walks the best opposite price, fills against the live
//! head of its level, and trades at the maker's price. Cancellation flags
//! the order and evicts it from the order map; levels and heaps clean up
//! lazily.
//!
//! The book does no I/O and never blocks. Contract violations are
//! programming errors and abort; an unknown id on cancel is an expected
//! outcome and is just reported.

use crate::book::{PriceHeap, PriceLevel};
use std::collections::HashMap;
use tracing::{debug, trace};
use types::time::now_nanos;
use types::{InstrumentId, Order, OrderId, OrderType, PartyId, Side, Trade};

/// Outcome of one submission: trades in execution order, plus the
/// post-fill snapshot of every maker touched. The maker snapshots let the
/// caller amend the durable journal, so replaying it alone reproduces
/// live state.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub trades: Vec<Trade>,
    pub maker_updates: Vec<Order>,
}

/// Per-instrument matching engine.
#[derive(Debug)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    bids: HashMap<u64, PriceLevel>,
    asks: HashMap<u64, PriceLevel>,
    bid_heap: PriceHeap,
    ask_heap: PriceHeap,
    /// Sole owner of every resting order. Entries are always live.
    oid_map: HashMap<OrderId, Order>,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: HashMap::new(),
            asks: HashMap::new(),
            bid_heap: PriceHeap::bids(),
            ask_heap: PriceHeap::asks(),
            oid_map: HashMap::new(),
        }
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    /// Run an incoming order through matching, mutating it in place and
    /// returning the trades in execution order plus the affected maker
    /// snapshots. GTC residue rests in the book; MARKET and IOC residue
    /// is cancelled.
    ///
    /// # Panics
    /// Panics when the order belongs to another instrument or the book
    /// would end up crossed; both are engine bugs, not inputs.
    pub fn submit(&mut self, order: &mut Order) -> MatchOutcome {
        assert_eq!(
            order.instrument_id, self.instrument_id,
            "order routed to the wrong book"
        );

        let price_limit = match order.order_type {
            OrderType::Market => None,
            OrderType::Gtc | OrderType::Ioc => Some(order.price_cents),
        };
        let outcome = Self::sweep(
            self.instrument_id,
            opposite_side_mut(order.side, &mut self.bids, &mut self.asks),
            opposite_heap_mut(order.side, &mut self.bid_heap, &mut self.ask_heap),
            &mut self.oid_map,
            order,
            price_limit,
        );

        if order.remaining_quantity > 0 {
            match order.order_type {
                OrderType::Gtc => self.rest_order(order.clone()),
                // Market and immediate-or-cancel residue never rests.
                OrderType::Market | OrderType::Ioc => {
                    order.cancel();
                    debug!(order_id = %order.order_id, residue = order.remaining_quantity,
                        "unfillable residue cancelled");
                }
            }
        }

        self.assert_uncrossed();
        debug!(order_id = %order.order_id, trades = outcome.trades.len(),
            remaining = order.remaining_quantity, "order processed");
        outcome
    }

    /// Idempotent cancel. Returns `true` only when the order was open and
    /// is now newly cancelled; unknown, filled, and already-cancelled ids
    /// all report `false`.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let Some(order) = self.oid_map.get_mut(&order_id) else {
            debug!(order_id = %order_id, "cancel miss");
            return false;
        };
        debug_assert!(order.is_live(), "order map held a dead order");
        order.cancel();
        let side = order.side;
        let price = order.price_cents;
        self.oid_map.remove(&order_id);

        let (levels, heap) = match side {
            Side::Buy => (&mut self.bids, &mut self.bid_heap),
            Side::Sell => (&mut self.asks, &mut self.ask_heap),
        };
        if let Some(level) = levels.get_mut(&price) {
            if level.is_empty_live(&self.oid_map) {
                levels.remove(&price);
                heap.mark_empty(price);
            }
        }
        debug!(order_id = %order_id, "order cancelled");
        true
    }

    /// Best bid price, pruning stale heap entries on the way.
    pub fn best_bid(&mut self) -> Option<u64> {
        self.bid_heap.best()
    }

    /// Best ask price, pruning stale heap entries on the way.
    pub fn best_ask(&mut self) -> Option<u64> {
        self.ask_heap.best()
    }

    /// Rest an order without matching. Used for GTC residue and for
    /// journal replay, which must preserve original ids and timestamps.
    pub fn rest_order(&mut self, order: Order) {
        debug_assert!(order.is_live(), "only live orders rest");
        let (levels, heap) = match order.side {
            Side::Buy => (&mut self.bids, &mut self.bid_heap),
            Side::Sell => (&mut self.asks, &mut self.ask_heap),
        };
        levels
            .entry(order.price_cents)
            .or_insert_with(|| PriceLevel::new(order.price_cents))
            .append(order.order_id);
        heap.push(order.price_cents);
        trace!(order_id = %order.order_id, price = order.price_cents, "order resting");
        self.oid_map.insert(order.order_id, order);
    }

    /// Resting order by id.
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.oid_map.get(&order_id)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.oid_map.contains_key(&order_id)
    }

    /// All resting orders, unordered.
    pub fn live_orders(&self) -> impl Iterator<Item = &Order> {
        self.oid_map.values()
    }

    pub fn live_order_count(&self) -> usize {
        self.oid_map.len()
    }

    /// Ids of the party's resting orders, ascending for determinism.
    pub fn order_ids_for_party(&self, party_id: PartyId) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self
            .oid_map
            .values()
            .filter(|o| o.party_id == party_id)
            .map(|o| o.order_id)
            .collect();
        ids.sort();
        ids
    }

    /// Matching loop shared by every order type: fill against the live
    /// head of the best opposite level while the taker has quantity and
    /// the price crosses (no bound for market orders).
    fn sweep(
        instrument_id: InstrumentId,
        levels: &mut HashMap<u64, PriceLevel>,
        heap: &mut PriceHeap,
        oid_map: &mut HashMap<OrderId, Order>,
        taker: &mut Order,
        price_limit: Option<u64>,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        while taker.remaining_quantity > 0 {
            let Some(best_price) = heap.best() else {
                trace!(order_id = %taker.order_id, "no opposite liquidity");
                break;
            };
            if let Some(limit) = price_limit {
                let crosses = match taker.side {
                    Side::Buy => best_price <= limit,
                    Side::Sell => best_price >= limit,
                };
                if !crosses {
                    trace!(order_id = %taker.order_id, best_price, limit, "no cross");
                    break;
                }
            }

            let Some(level) = levels.get_mut(&best_price) else {
                heap.mark_empty(best_price);
                continue;
            };
            let Some(maker_id) = level.peek_live(oid_map) else {
                levels.remove(&best_price);
                heap.mark_empty(best_price);
                continue;
            };

            let maker = oid_map.get_mut(&maker_id).expect("live maker is owned");
            let quantity = taker.remaining_quantity.min(maker.remaining_quantity);
            taker.fill(quantity);
            maker.fill(quantity);

            let trade = Trade {
                instrument_id,
                price_cents: maker.price_cents,
                quantity,
                timestamp: now_nanos(),
                maker_order_id: maker.order_id,
                maker_party_id: maker.party_id,
                taker_order_id: taker.order_id,
                taker_party_id: taker.party_id,
                maker_is_buyer: maker.side == Side::Buy,
                maker_quantity_remaining: maker.remaining_quantity,
                taker_quantity_remaining: taker.remaining_quantity,
            };
            let maker_filled = maker.remaining_quantity == 0;
            let maker_snapshot = maker.clone();
            trace!(maker = %maker_id, taker = %taker.order_id, quantity,
                price = trade.price_cents, "trade executed");

            if maker_filled {
                oid_map.remove(&maker_id);
                level.pop_front();
                if level.is_empty_live(oid_map) {
                    levels.remove(&best_price);
                    heap.mark_empty(best_price);
                }
            }
            outcome.trades.push(trade);
            outcome.maker_updates.push(maker_snapshot);
        }
        outcome
    }

    fn assert_uncrossed(&mut self) {
        if let (Some(bid), Some(ask)) = (self.bid_heap.best(), self.ask_heap.best()) {
            assert!(bid < ask, "book crossed after match: bid {} >= ask {}", bid, ask);
        }
    }
}

fn opposite_side_mut<'a>(
    side: Side,
    bids: &'a mut HashMap<u64, PriceLevel>,
    asks: &'a mut HashMap<u64, PriceLevel>,
) -> &'a mut HashMap<u64, PriceLevel> {
    match side {
        Side::Buy => asks,
        Side::Sell => bids,
    }
}

fn opposite_heap_mut<'a>(
    side: Side,
    bid_heap: &'a mut PriceHeap,
    ask_heap: &'a mut PriceHeap,
) -> &'a mut PriceHeap {
    match side {
        Side::Buy => ask_heap,
        Side::Sell => bid_heap,
    }
}
