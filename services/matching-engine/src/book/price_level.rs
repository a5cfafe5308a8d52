//! FIFO queue of resting orders at one price
//!
//! The level stores order ids only; the book's order map owns the orders.
//! Removal is lazy: cancellation just makes the order dead in the map, and
//! the level discards dead heads the next time it is inspected. Each id is
//! discarded at most once, so the amortized cost stays constant.

use std::collections::{HashMap, VecDeque};
use types::{Order, OrderId};

/// Orders queued at a single price, in arrival order.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price_cents: u64,
    queue: VecDeque<OrderId>,
}

impl PriceLevel {
    pub fn new(price_cents: u64) -> Self {
        Self {
            price_cents,
            queue: VecDeque::new(),
        }
    }

    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    /// Queue an order at the tail.
    pub fn append(&mut self, order_id: OrderId) {
        self.queue.push_back(order_id);
    }

    /// First live order in the queue, discarding dead heads along the way.
    ///
    /// An id is dead when the owning map no longer holds it (filled or
    /// cancelled orders are evicted from the map) or holds it in a
    /// non-live state.
    pub fn peek_live(&mut self, orders: &HashMap<OrderId, Order>) -> Option<OrderId> {
        while let Some(&head) = self.queue.front() {
            if orders.get(&head).is_some_and(|o| o.is_live()) {
                return Some(head);
            }
            self.queue.pop_front();
        }
        None
    }

    /// Drop the current front unconditionally.
    pub fn pop_front(&mut self) -> Option<OrderId> {
        self.queue.pop_front()
    }

    /// True when no live order remains at this price.
    pub fn is_empty_live(&mut self, orders: &HashMap<OrderId, Order>) -> bool {
        self.peek_live(orders).is_none()
    }

    /// Queued entries, live or not.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
