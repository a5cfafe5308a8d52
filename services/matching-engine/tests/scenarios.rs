//! End-to-end matching scenarios through the full exchange stack:
//! durable queued writer + broadcast + backup behind one composite.

use matching_engine::{Exchange, SubmitOrderRequest};
use persistence::{
    BackupWriter, BroadcastWriter, CompositeWriter, OrderStore, QueuedDurableWriter, StoreConfig,
    Writer,
};
use std::sync::Arc;
use tempfile::TempDir;
use types::{InstrumentId, OrderId, OrderType, PartyId, Side};

struct Harness {
    exchange: Exchange,
    durable: Arc<QueuedDurableWriter>,
    broadcast: Arc<BroadcastWriter>,
    _tmp: TempDir,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let store = OrderStore::open(StoreConfig::new(tmp.path().join("store"))).unwrap();
    let durable = Arc::new(QueuedDurableWriter::new(store));
    let broadcast = Arc::new(BroadcastWriter::new());
    let backup = Arc::new(BackupWriter::new(tmp.path().join("backup")).unwrap());

    let composite = CompositeWriter::new(vec![
        durable.clone() as Arc<dyn Writer>,
        broadcast.clone(),
        backup,
    ]);
    let exchange = Exchange::new(composite);
    exchange
        .create_book(InstrumentId(100), "ACME", "scenario instrument", PartyId(1))
        .unwrap();
    Harness {
        exchange,
        durable,
        broadcast,
        _tmp: tmp,
    }
}

fn request(
    side: Side,
    order_type: OrderType,
    price_cents: Option<u64>,
    quantity: u64,
    party: u64,
) -> SubmitOrderRequest {
    SubmitOrderRequest {
        instrument_id: InstrumentId(100),
        side,
        order_type,
        price_cents,
        quantity,
        party_id: PartyId(party),
    }
}

#[test]
fn partial_cross_leaves_maker_residue_live() {
    let h = harness();
    let party_a = 1;
    let party_b = 2;

    let sell = h
        .exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_000), 5, party_a))
        .unwrap();
    assert_eq!(sell.order_id, OrderId(1));
    assert!(sell.trades.is_empty());
    assert_eq!(sell.remaining_quantity, 5);

    let buy = h
        .exchange
        .submit_order(&request(Side::Buy, OrderType::Gtc, Some(10_100), 3, party_b))
        .unwrap();
    assert_eq!(buy.order_id, OrderId(2));
    assert_eq!(buy.remaining_quantity, 0);
    assert_eq!(buy.trades.len(), 1);

    let t = &buy.trades[0];
    assert_eq!(t.price_cents, 10_000);
    assert_eq!(t.quantity, 3);
    assert_eq!(t.maker_order_id, OrderId(1));
    assert_eq!(t.taker_order_id, OrderId(2));
    assert_eq!(t.maker_party_id, PartyId(party_a));
    assert_eq!(t.taker_party_id, PartyId(party_b));
    assert!(!t.maker_is_buyer);
    assert_eq!(t.maker_quantity_remaining, 2);
    assert_eq!(t.taker_quantity_remaining, 0);

    h.durable.drain().unwrap();
    let live = h.exchange.live_orders(InstrumentId(100)).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].order_id, OrderId(1));
    assert_eq!(live[0].remaining_quantity, 2);
}

#[test]
fn market_order_sweeps_price_levels_in_order() {
    let h = harness();
    for (price, qty) in [(20_000, 1), (20_005, 2), (20_010, 3)] {
        h.exchange
            .submit_order(&request(Side::Sell, OrderType::Gtc, Some(price), qty, 1))
            .unwrap();
    }

    let market = h
        .exchange
        .submit_order(&request(Side::Buy, OrderType::Market, None, 4, 2))
        .unwrap();
    assert!(!market.cancelled);
    assert_eq!(market.remaining_quantity, 0);
    assert_eq!(
        market
            .trades
            .iter()
            .map(|t| (t.price_cents, t.quantity))
            .collect::<Vec<_>>(),
        vec![(20_000, 1), (20_005, 2), (20_010, 1)]
    );
    assert_eq!(market.trades[2].maker_quantity_remaining, 2);

    h.durable.drain().unwrap();
    let live = h.exchange.live_orders(InstrumentId(100)).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].order_id, OrderId(3));
    assert_eq!(live[0].remaining_quantity, 2);
}

#[test]
fn ioc_residue_is_cancelled_and_never_rests() {
    let h = harness();
    h.exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(30_000), 2, 1))
        .unwrap();

    let ioc = h
        .exchange
        .submit_order(&request(Side::Buy, OrderType::Ioc, Some(30_000), 5, 2))
        .unwrap();
    assert_eq!(ioc.trades.len(), 1);
    assert_eq!(ioc.trades[0].quantity, 2);
    assert!(ioc.cancelled);
    assert_eq!(ioc.remaining_quantity, 3);

    h.durable.drain().unwrap();
    assert!(h.exchange.live_orders(InstrumentId(100)).unwrap().is_empty());

    // The journal keeps the cancelled taker snapshot.
    let history = h.exchange.order_history(InstrumentId(100)).unwrap();
    let taker = history.iter().find(|o| o.order_id == ioc.order_id).unwrap();
    assert!(taker.cancelled);
    assert_eq!(taker.remaining_quantity, 3);
}

#[test]
fn double_cancel_reports_order_not_open() {
    let h = harness();
    let ack = h
        .exchange
        .submit_order(&request(Side::Buy, OrderType::Gtc, Some(100), 4, 1))
        .unwrap();

    h.exchange
        .cancel_order(InstrumentId(100), ack.order_id, PartyId(1))
        .unwrap();
    let err = h
        .exchange
        .cancel_order(InstrumentId(100), ack.order_id, PartyId(1))
        .unwrap_err();
    assert_eq!(err, types::ExchangeError::OrderNotOpen(ack.order_id));

    h.durable.drain().unwrap();
    assert!(h.exchange.trade_history(InstrumentId(100)).unwrap().is_empty());
}

#[test]
fn cancel_all_reports_orders_filled_mid_operation() {
    // An order filled between the open-order snapshot and its turn in the
    // cancel loop must land in failed_ids, not vanish from the outcome.
    // The book lock is released between per-order cancels, so a concurrent
    // taker can land mid-loop; the window depends on scheduling, so the
    // scenario is retried until the interleaving is observed.
    const ORDERS: u64 = 200;
    for _ in 0..60 {
        let h = harness();
        for i in 0..ORDERS {
            h.exchange
                .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_000 + i), 1, 9))
                .unwrap();
        }

        let (outcome, fill) = std::thread::scope(|s| {
            let canceller = s.spawn(|| {
                h.exchange
                    .cancel_all_for_party(InstrumentId(100), PartyId(9))
                    .unwrap()
            });
            let taker = s.spawn(|| {
                h.exchange
                    .submit_order(&request(Side::Buy, OrderType::Market, None, 1, 2))
                    .unwrap()
            });
            (canceller.join().unwrap(), taker.join().unwrap())
        });

        // Fill landed before the snapshot (that id never appears in the
        // outcome) or after the last cancel (no liquidity left): retry.
        if outcome.failed_ids.is_empty() {
            continue;
        }

        // The fill landed mid-operation: the snapshot held every order,
        // and exactly the filled one could no longer be cancelled.
        assert_eq!(outcome.failed_ids.len(), 1);
        assert_eq!(fill.trades.len(), 1);
        assert_eq!(fill.trades[0].maker_order_id, outcome.failed_ids[0]);
        assert_eq!(outcome.cancelled_ids.len(), (ORDERS - 1) as usize);
        assert!(!outcome.cancelled_ids.contains(&outcome.failed_ids[0]));
        assert_eq!(
            h.exchange.top_of_book(InstrumentId(100)).unwrap(),
            (None, None)
        );
        return;
    }
    panic!("concurrent fill never landed between snapshot and cancel");
}

#[test]
fn cancel_all_only_sees_orders_open_at_the_snapshot() {
    let h = harness();
    let first = h
        .exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_000), 2, 9))
        .unwrap();
    let second = h
        .exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_005), 2, 9))
        .unwrap();
    let third = h
        .exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_010), 2, 9))
        .unwrap();

    // A trade that completed before the call closes the first two orders,
    // so the snapshot no longer contains them.
    h.exchange
        .submit_order(&request(Side::Buy, OrderType::Gtc, Some(10_005), 4, 2))
        .unwrap();

    let outcome = h
        .exchange
        .cancel_all_for_party(InstrumentId(100), PartyId(9))
        .unwrap();
    assert_eq!(outcome.cancelled_ids, vec![third.order_id]);
    assert!(outcome.failed_ids.is_empty());

    // Cancelling the already-filled orders directly reports them closed.
    for id in [first.order_id, second.order_id] {
        let err = h
            .exchange
            .cancel_order(InstrumentId(100), id, PartyId(9))
            .unwrap_err();
        assert_eq!(err, types::ExchangeError::OrderNotOpen(id));
    }

    h.durable.drain().unwrap();
    assert!(h.exchange.live_orders(InstrumentId(100)).unwrap().is_empty());
}

#[test]
fn writer_events_preserve_submission_order() {
    let h = harness();
    let mut rx = h.broadcast.subscribe();

    h.exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_000), 2, 1))
        .unwrap();
    h.exchange
        .submit_order(&request(Side::Buy, OrderType::Gtc, Some(10_000), 2, 2))
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        kinds.push(value["kind"].as_str().unwrap().to_string());
    }
    // First submit: the taker order only. Second submit: the taker order,
    // its trade, then the filled maker's journal amendment.
    assert_eq!(kinds, vec!["ORDER", "ORDER", "TRADE", "ORDER"]);
}

#[test]
fn trade_journal_matches_emitted_trades() {
    let h = harness();
    h.exchange
        .submit_order(&request(Side::Sell, OrderType::Gtc, Some(10_000), 5, 1))
        .unwrap();
    let buy = h
        .exchange
        .submit_order(&request(Side::Buy, OrderType::Gtc, Some(10_000), 3, 2))
        .unwrap();

    h.durable.drain().unwrap();
    let journal = h.exchange.trade_history(InstrumentId(100)).unwrap();
    assert_eq!(journal, buy.trades);
}
