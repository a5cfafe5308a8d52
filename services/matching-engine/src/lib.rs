//! Matching engine service
//!
//! Per-instrument order books under price-time priority, and the
//! [`Exchange`] façade that sequences orders, allocates ids, and fans
//! durable events out through the writer pipeline.
//!
//! # Entry point
//!
//! Build a [`persistence::CompositeWriter`], then [`Exchange::recover`]
//! to rebuild books from the journal, and serve requests through
//! [`Exchange::submit_order`] / [`Exchange::cancel_order`].

pub mod book;
pub mod exchange;
pub mod order_book;
pub mod requests;

pub use exchange::Exchange;
pub use order_book::{MatchOutcome, OrderBook};
pub use requests::{CancelAccepted, CancelAllOutcome, OrderAccepted, SubmitOrderRequest};
