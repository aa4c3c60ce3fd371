// ============================================================================
// Tokenbook Library
// Limit-order matching and batched settlement for tokenized assets
// ============================================================================

//! # Tokenbook
//!
//! A limit-order matching engine for fractional tokenized assets, with
//! batched settlement against an external ledger.
//!
//! ## Features
//!
//! - **Price-time priority matching** with maker-price execution
//! - **Self-trade prevention** that skips same-owner resting orders in place
//! - **Fractional quantities** with per-asset minimum trade units and dust
//!   absorption
//! - **Per-asset single-writer workers**, so assets never contend
//! - **Batched settlement** with commit-time fees, bounded retry, and
//!   degradation instead of data loss
//! - **Typed engine events** for market data, portfolio, and ledger export
//!
//! ## Example
//!
//! ```rust
//! use tokenbook::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let catalog = StaticCatalog::new().with_asset(AssetSpec::new(
//!     AssetId::new("PROP-001"),
//!     2,              // price precision (cents)
//!     Decimal::ONE,   // minimum trade unit
//! ));
//! let exchange = Exchange::new(Arc::new(catalog));
//!
//! exchange
//!     .place_order(
//!         AssetId::new("PROP-001"),
//!         OwnerId::new("alice"),
//!         Side::Sell,
//!         Decimal::from(10),
//!         Decimal::from(60),
//!     )
//!     .unwrap();
//!
//! let buy_id = exchange
//!     .place_order(
//!         AssetId::new("PROP-001"),
//!         OwnerId::new("bob"),
//!         Side::Buy,
//!         Decimal::from(10),
//!         Decimal::from(100),
//!     )
//!     .unwrap();
//!
//! // 60 tokens traded at 10; the remaining 40 rest as the best bid
//! let status = exchange.order_status(&buy_id).unwrap();
//! assert_eq!(status.filled_quantity, Decimal::from(60));
//!
//! let snapshot = exchange.book_snapshot(&AssetId::new("PROP-001"), 10).unwrap();
//! assert_eq!(snapshot.best_bid(), Some(Decimal::from(10)));
//! ```

pub mod domain;
pub mod engine;
pub mod errors;
pub mod exchange;
pub mod interfaces;
pub mod settlement;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::order::state::{OrderState, OrderStateTransition};
    pub use crate::domain::{
        AssetCatalog, AssetId, AssetSpec, BatchId, BatchStatus, BatchSummary, BookSnapshot,
        Order, OrderBook, OrderId, OwnerId, SettlementBatch, Side, StaticCatalog, Trade, TradeId,
    };
    pub use crate::engine::{MatchOutcome, Matcher};
    pub use crate::errors::{EngineError, SettlementError, ValidationError};
    pub use crate::exchange::{Exchange, ExchangeConfig, OrderStatusView, SettlementTicker};
    pub use crate::interfaces::{
        CollectingEventHandler, EngineEvent, EventHandler, LoggingEventHandler, NoOpEventHandler,
    };
    pub use crate::settlement::{
        BatchStatusView, Batcher, BatcherConfig, InMemoryLedger, SettlementLedger,
    };
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    fn catalog() -> Arc<StaticCatalog> {
        Arc::new(
            StaticCatalog::new()
                // 0.1-token units on PROP-001, whole tokens on PROP-002
                .with_asset(AssetSpec::new(AssetId::new("PROP-001"), 2, Decimal::new(1, 1)))
                .with_asset(AssetSpec::new(AssetId::new("PROP-002"), 2, Decimal::ONE)),
        )
    }

    fn exchange_with_events() -> (Exchange, Arc<CollectingEventHandler>, Arc<InMemoryLedger>) {
        let handler = Arc::new(CollectingEventHandler::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let exchange = Exchange::with_config(
            catalog(),
            Arc::clone(&ledger) as Arc<dyn SettlementLedger>,
            Arc::clone(&handler) as Arc<dyn EventHandler>,
            ExchangeConfig {
                fee_bps: 25,
                initial_backoff: Duration::from_millis(5),
                ..ExchangeConfig::default()
            },
        );
        (exchange, handler, ledger)
    }

    fn place(
        exchange: &Exchange,
        owner: &str,
        side: Side,
        price: i64,
        quantity: &str,
    ) -> OrderId {
        exchange
            .place_order(
                AssetId::new("PROP-001"),
                OwnerId::new(owner),
                side,
                Decimal::from(price),
                quantity.parse().unwrap(),
            )
            .unwrap()
    }

    fn wait_for_batch(exchange: &Exchange, batch_id: BatchId, wanted: BatchStatus) {
        for _ in 0..200 {
            if exchange.batch_status(&batch_id).unwrap().status == wanted {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("batch {} never reached {:?}", batch_id, wanted);
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let (exchange, handler, _) = exchange_with_events();

        let sell = place(&exchange, "alice", Side::Sell, 10, "60");
        let buy = place(&exchange, "bob", Side::Buy, 10, "100");

        let sell_status = exchange.order_status(&sell).unwrap();
        assert_eq!(sell_status.state, OrderState::Filled);
        assert_eq!(sell_status.filled_quantity, Decimal::from(60));

        let buy_status = exchange.order_status(&buy).unwrap();
        assert_eq!(buy_status.state, OrderState::PartiallyFilled);
        assert_eq!(buy_status.remaining_quantity, Decimal::from(40));

        let trades: Vec<Trade> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::TradeExecuted { trade, .. } => Some(trade),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Decimal::from(10));
        assert_eq!(trades[0].quantity, Decimal::from(60));
        assert_eq!(trades[0].maker_order_id, sell);
        assert_eq!(trades[0].taker_order_id, buy);
    }

    #[test]
    fn test_no_cross_no_trade() {
        let (exchange, handler, _) = exchange_with_events();

        place(&exchange, "alice", Side::Sell, 11, "50");
        place(&exchange, "bob", Side::Buy, 10, "50");

        assert!(!handler
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::TradeExecuted { .. })));

        let snapshot = exchange
            .book_snapshot(&AssetId::new("PROP-001"), 10)
            .unwrap();
        assert_eq!(snapshot.best_bid(), Some(Decimal::from(10)));
        assert_eq!(snapshot.best_ask(), Some(Decimal::from(11)));
        assert_eq!(snapshot.spread, Some(Decimal::ONE));
    }

    #[test]
    fn test_self_trade_skipped_not_errored() {
        let (exchange, handler, _) = exchange_with_events();

        let own_bid = place(&exchange, "alice", Side::Buy, 10, "50");
        // Alice's own crossing sell must not match her bid
        let own_sell = place(&exchange, "alice", Side::Sell, 10, "50");

        assert!(!handler
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::TradeExecuted { .. })));
        assert_eq!(
            exchange.order_status(&own_bid).unwrap().state,
            OrderState::Pending
        );
        assert_eq!(
            exchange.order_status(&own_sell).unwrap().state,
            OrderState::Pending
        );

        // Bob's sell matches the bid Alice could not
        place(&exchange, "bob", Side::Sell, 10, "50");
        assert_eq!(
            exchange.order_status(&own_bid).unwrap().state,
            OrderState::Filled
        );
    }

    #[test]
    fn test_cancel_race_resolves_deterministically() {
        let (exchange, _, _) = exchange_with_events();

        let resting = place(&exchange, "alice", Side::Sell, 10, "50");
        exchange
            .cancel_order(&resting, &OwnerId::new("alice"))
            .unwrap();

        // The cancel was processed first, so the crossing buy finds nothing
        let buy = place(&exchange, "bob", Side::Buy, 10, "50");
        assert_eq!(
            exchange.order_status(&buy).unwrap().state,
            OrderState::Pending
        );
        assert_eq!(
            exchange.order_status(&resting).unwrap().state,
            OrderState::Cancelled
        );

        // A second cancel sees the terminal state
        let err = exchange
            .cancel_order(&resting, &OwnerId::new("alice"))
            .unwrap_err();
        assert_eq!(err, EngineError::AlreadyTerminal(OrderState::Cancelled));
    }

    #[test]
    fn test_dust_never_rests() {
        let (exchange, _, _) = exchange_with_events();

        // Unit is 0.1: the 0.05 residue on the maker is absorbed, not rested
        place(&exchange, "alice", Side::Sell, 10, "5.35");
        let buy = place(&exchange, "bob", Side::Buy, 10, "5.3");

        assert_eq!(
            exchange.order_status(&buy).unwrap().state,
            OrderState::Filled
        );
        let snapshot = exchange
            .book_snapshot(&AssetId::new("PROP-001"), 10)
            .unwrap();
        assert!(snapshot.asks.is_empty());
        assert!(snapshot.bids.is_empty());
    }

    #[test]
    fn test_batch_commit_with_fees() {
        let (exchange, handler, ledger) = exchange_with_events();
        let asset = AssetId::new("PROP-001");

        place(&exchange, "alice", Side::Sell, 100, "2");
        place(&exchange, "bob", Side::Buy, 100, "2");

        let batch_id = exchange.open_batch_id(&asset).unwrap();
        exchange.settlement_tick(&asset).unwrap();
        wait_for_batch(&exchange, batch_id, BatchStatus::Committed);

        // Notional 200 at 25 bps, rounded half-up to cents
        let committed = ledger.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].batch_id, batch_id);
        assert_eq!(committed[0].total_fees, Decimal::new(50, 2));

        assert!(handler.events().iter().any(|e| matches!(
            e,
            EngineEvent::BatchCommitted { summary, .. } if summary.batch_id == batch_id
        )));

        // The next batch is already collecting
        assert_ne!(exchange.open_batch_id(&asset).unwrap(), batch_id);
    }

    #[test]
    fn test_degraded_batch_keeps_trades_queryable() {
        let handler = Arc::new(CollectingEventHandler::new());
        let exchange = Exchange::with_config(
            catalog(),
            Arc::new(InMemoryLedger::failing(100)),
            Arc::clone(&handler) as Arc<dyn EventHandler>,
            ExchangeConfig {
                max_commit_attempts: 2,
                initial_backoff: Duration::from_millis(5),
                ..ExchangeConfig::default()
            },
        );
        let asset = AssetId::new("PROP-001");

        place(&exchange, "alice", Side::Sell, 10, "1");
        let buy = place(&exchange, "bob", Side::Buy, 10, "1");

        // The fill is final before settlement even starts
        assert_eq!(
            exchange.order_status(&buy).unwrap().state,
            OrderState::Filled
        );

        let batch_id = exchange.open_batch_id(&asset).unwrap();
        exchange.settlement_tick(&asset).unwrap();
        wait_for_batch(&exchange, batch_id, BatchStatus::Degraded);

        // Settlement failure never unwinds the trade record
        assert_eq!(exchange.batch_status(&batch_id).unwrap().trade_count, 1);
        assert!(handler
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::BatchDegraded { .. })));
    }

    #[test]
    fn test_ttl_expiry_through_tick() {
        let (exchange, handler, _) = exchange_with_events();
        let asset = AssetId::new("PROP-001");

        let short_lived = exchange
            .place_order_with_ttl(
                asset.clone(),
                OwnerId::new("alice"),
                Side::Buy,
                Decimal::from(10),
                Decimal::from(5),
                ChronoDuration::milliseconds(-1), // already past deadline
            )
            .unwrap();

        exchange.settlement_tick(&asset).unwrap();

        // The tick runs asynchronously on the asset worker
        for _ in 0..200 {
            if exchange.order_status(&short_lived).unwrap().state == OrderState::Expired {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            exchange.order_status(&short_lived).unwrap().state,
            OrderState::Expired
        );
        assert!(handler
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::OrderExpired { order_id, .. } if *order_id == short_lived)));
    }

    #[test]
    fn test_fifo_priority_at_equal_price() {
        let (exchange, handler, _) = exchange_with_events();

        let first = place(&exchange, "alice", Side::Sell, 10, "5");
        let second = place(&exchange, "carol", Side::Sell, 10, "5");
        place(&exchange, "bob", Side::Buy, 10, "5");

        // Equal price: the earlier sell fills first
        assert_eq!(
            exchange.order_status(&first).unwrap().state,
            OrderState::Filled
        );
        assert_eq!(
            exchange.order_status(&second).unwrap().state,
            OrderState::Pending
        );

        let trades: Vec<Trade> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::TradeExecuted { trade, .. } => Some(trade),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].maker_order_id, first);
    }

    #[test]
    fn test_background_ticker_commits() {
        let handler = Arc::new(CollectingEventHandler::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let exchange = Arc::new(Exchange::with_config(
            catalog(),
            Arc::clone(&ledger) as Arc<dyn SettlementLedger>,
            Arc::clone(&handler) as Arc<dyn EventHandler>,
            ExchangeConfig {
                settlement_interval: Duration::from_millis(20),
                initial_backoff: Duration::from_millis(5),
                ..ExchangeConfig::default()
            },
        ));

        place(&exchange, "alice", Side::Sell, 10, "1");
        place(&exchange, "bob", Side::Buy, 10, "1");

        let ticker = exchange.start_settlement_ticker();
        for _ in 0..200 {
            if ledger.commit_count() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        ticker.stop();

        assert_eq!(ledger.commit_count(), 1);
    }
}
