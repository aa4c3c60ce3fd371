// ============================================================================
// Order Book Domain Model
// ============================================================================

use crossbeam_skiplist::SkipMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use super::asset::AssetId;
use super::order::{decimal_to_raw, Order, OrderId, Side};
use crate::errors::EngineError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Priority Key
// ============================================================================

/// Sort key encoding price-time priority.
///
/// `price_sort` is the raw price mantissa for asks and its negation for bids,
/// so ascending key order is always "best price first"; `seq` breaks ties in
/// submission order (FIFO at equal price).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BookKey {
    price_sort: i64,
    seq: u64,
}

impl BookKey {
    fn for_order(side: Side, price: Decimal, seq: u64) -> Self {
        let price_raw = decimal_to_raw(price);
        match side {
            Side::Buy => Self {
                price_sort: -price_raw,
                seq,
            },
            Side::Sell => Self {
                price_sort: price_raw,
                seq,
            },
        }
    }
}

// ============================================================================
// Book Side
// ============================================================================

/// One side of the book: a skip list of resting orders keyed by priority.
///
/// Best order is the front entry; insert and remove are O(log n).
pub struct BookSide {
    side: Side,
    entries: SkipMap<BookKey, Arc<Order>>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            entries: SkipMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    fn insert(&self, order: Arc<Order>) -> BookKey {
        let key = BookKey::for_order(self.side, order.limit_price, order.sequence());
        self.entries.insert(key, order);
        key
    }

    fn remove(&self, key: &BookKey) -> Option<Arc<Order>> {
        self.entries.remove(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Best-priced, earliest-sequence resting order.
    pub fn best(&self) -> Option<Arc<Order>> {
        self.entries.front().map(|entry| Arc::clone(entry.value()))
    }

    pub fn best_price(&self) -> Option<Decimal> {
        self.best().map(|order| order.limit_price)
    }

    /// Resting orders in priority order (best first).
    pub fn iter_priority(&self) -> impl Iterator<Item = (BookKey, Arc<Order>)> + '_ {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total remaining quantity resting on this side.
    pub fn total_remaining(&self) -> Decimal {
        self.iter_priority()
            .map(|(_, order)| order.remaining_quantity())
            .sum()
    }

    /// Aggregate (price, quantity) levels, best first, up to `num_levels`.
    pub fn depth(&self, num_levels: usize) -> Vec<(Decimal, Decimal)> {
        let mut levels: Vec<(Decimal, Decimal)> = Vec::new();

        for (_, order) in self.iter_priority() {
            let price = order.limit_price;
            let quantity = order.remaining_quantity();

            match levels.last_mut() {
                Some((level_price, level_quantity)) if *level_price == price => {
                    *level_quantity += quantity;
                },
                _ => {
                    if levels.len() == num_levels {
                        break;
                    }
                    levels.push((price, quantity));
                },
            }
        }

        levels
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Per-asset limit order book.
///
/// Owned and mutated exclusively by the asset's matching worker; the book
/// itself never publishes events. Removal by id is backed by an index of
/// resting keys.
pub struct OrderBook {
    pub asset_id: AssetId,
    bids: BookSide,
    asks: BookSide,
    resting: HashMap<OrderId, BookKey>,
}

impl OrderBook {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            resting: HashMap::new(),
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Rest an order at its price level, FIFO within the level.
    pub fn insert(&mut self, order: Arc<Order>) {
        let key = match order.side {
            Side::Buy => self.bids.insert(Arc::clone(&order)),
            Side::Sell => self.asks.insert(Arc::clone(&order)),
        };
        self.resting.insert(order.id, key);
        self.debug_assert_uncrossed();
    }

    /// Remove an order regardless of fill state (full fill, cancel, expiry).
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Arc<Order>, EngineError> {
        let key = self
            .resting
            .remove(order_id)
            .ok_or(EngineError::OrderNotFound(*order_id))?;

        let order = self
            .bids
            .remove(&key)
            .or_else(|| self.asks.remove(&key))
            .ok_or(EngineError::OrderNotFound(*order_id))?;

        Ok(order)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.resting.contains_key(order_id)
    }

    pub fn peek_best(&self, side: Side) -> Option<Arc<Order>> {
        self.side(side).best()
    }

    pub fn best_bid_ask(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.bids.best_price(), self.asks.best_price())
    }

    pub fn depth_snapshot(&self, num_levels: usize) -> BookSnapshot {
        BookSnapshot::with_depth(
            self.asset_id.clone(),
            self.bids.depth(num_levels),
            self.asks.depth(num_levels),
        )
    }

    /// Resting orders whose TTL deadline has passed.
    pub fn expired_orders(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<Arc<Order>> {
        self.bids
            .iter_priority()
            .chain(self.asks.iter_priority())
            .filter(|(_, order)| order.is_expired_at(now))
            .map(|(_, order)| order)
            .collect()
    }

    /// A crossed top of book may only persist between same-owner orders,
    /// which self-trade prevention keeps from matching.
    pub fn debug_assert_uncrossed(&self) {
        #[cfg(debug_assertions)]
        if let (Some(bid), Some(ask)) = (self.bids.best(), self.asks.best()) {
            if bid.limit_price >= ask.limit_price {
                debug_assert_eq!(
                    bid.owner, ask.owner,
                    "book crossed between distinct owners: bid {} >= ask {}",
                    bid.limit_price, ask.limit_price
                );
            }
        }
    }
}

// ============================================================================
// Book Snapshot
// ============================================================================

/// Immutable snapshot of aggregated book depth, for market-data display.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookSnapshot {
    pub asset_id: AssetId,
    /// Bid levels (price, quantity), best first
    pub bids: Vec<(Decimal, Decimal)>,
    /// Ask levels (price, quantity), best first
    pub asks: Vec<(Decimal, Decimal)>,
    /// Current spread (ask - bid)
    pub spread: Option<Decimal>,
    /// Mid price
    pub mid_price: Option<Decimal>,
}

impl BookSnapshot {
    pub fn empty(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            bids: Vec::new(),
            asks: Vec::new(),
            spread: None,
            mid_price: None,
        }
    }

    pub fn with_depth(
        asset_id: AssetId,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    ) -> Self {
        let spread = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        };

        let mid_price = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        };

        Self {
            asset_id,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    /// Copy limited to the top `num_levels` levels per side.
    pub fn truncated(&self, num_levels: usize) -> Self {
        Self::with_depth(
            self.asset_id.clone(),
            self.bids.iter().take(num_levels).cloned().collect(),
            self.asks.iter().take(num_levels).cloned().collect(),
        )
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> Decimal {
        self.bids.iter().map(|(_, qty)| qty).sum()
    }

    pub fn total_ask_quantity(&self) -> Decimal {
        self.asks.iter().map(|(_, qty)| qty).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OwnerId;

    fn resting(
        book: &mut OrderBook,
        owner: &str,
        side: Side,
        price: i64,
        quantity: i64,
        seq: u64,
    ) -> Arc<Order> {
        let order = Arc::new(Order::new(
            book.asset_id.clone(),
            OwnerId::new(owner),
            side,
            Decimal::from(price),
            Decimal::from(quantity),
            None,
        ));
        order.set_sequence(seq);
        book.insert(Arc::clone(&order));
        order
    }

    #[test]
    fn test_best_of_side() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));

        resting(&mut book, "a", Side::Buy, 10, 5, 1);
        resting(&mut book, "b", Side::Buy, 12, 5, 2);
        resting(&mut book, "c", Side::Sell, 15, 5, 3);
        resting(&mut book, "d", Side::Sell, 14, 5, 4);

        // Best bid is highest, best ask is lowest
        assert_eq!(book.best_bid_ask(), (Some(Decimal::from(12)), Some(Decimal::from(14))));
    }

    #[test]
    fn test_fifo_within_level() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));

        let first = resting(&mut book, "a", Side::Sell, 10, 5, 1);
        let _second = resting(&mut book, "b", Side::Sell, 10, 5, 2);

        assert_eq!(book.peek_best(Side::Sell).unwrap().id, first.id);
    }

    #[test]
    fn test_remove_unknown_order() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));
        let missing = OrderId::new();

        assert!(matches!(
            book.remove(&missing),
            Err(EngineError::OrderNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn test_remove_clears_index() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));
        let order = resting(&mut book, "a", Side::Buy, 10, 5, 1);

        assert!(book.contains(&order.id));
        let removed = book.remove(&order.id).unwrap();
        assert_eq!(removed.id, order.id);
        assert!(!book.contains(&order.id));
        assert!(book.side(Side::Buy).is_empty());
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));

        resting(&mut book, "a", Side::Buy, 10, 5, 1);
        resting(&mut book, "b", Side::Buy, 10, 3, 2);
        resting(&mut book, "c", Side::Buy, 9, 2, 3);

        let snapshot = book.depth_snapshot(10);
        assert_eq!(
            snapshot.bids,
            vec![
                (Decimal::from(10), Decimal::from(8)),
                (Decimal::from(9), Decimal::from(2)),
            ]
        );
    }

    #[test]
    fn test_snapshot_spread_and_mid() {
        let snapshot = BookSnapshot::with_depth(
            AssetId::new("PROP-001"),
            vec![(Decimal::from(10), Decimal::from(1))],
            vec![(Decimal::from(12), Decimal::from(2))],
        );

        assert_eq!(snapshot.best_bid(), Some(Decimal::from(10)));
        assert_eq!(snapshot.best_ask(), Some(Decimal::from(12)));
        assert_eq!(snapshot.spread, Some(Decimal::from(2)));
        assert_eq!(snapshot.mid_price, Some(Decimal::from(11)));
    }

    #[test]
    fn test_expired_orders_sweep() {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));
        let now = chrono::Utc::now();

        let order = Arc::new(Order::new(
            book.asset_id.clone(),
            OwnerId::new("a"),
            Side::Buy,
            Decimal::from(10),
            Decimal::from(1),
            Some(now - chrono::Duration::seconds(5)),
        ));
        order.set_sequence(1);
        book.insert(Arc::clone(&order));
        resting(&mut book, "b", Side::Buy, 9, 1, 2);

        let expired = book.expired_orders(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, order.id);
    }
}
