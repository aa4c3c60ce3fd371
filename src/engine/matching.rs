// ============================================================================
// Price/Time Priority Matching
// Core matching loop: maker-price execution, self-trade skip, dust absorption
// ============================================================================

use crate::domain::{AssetSpec, Order, OrderBook, OrderState, Trade};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::sync::Arc;

/// Result of submitting one order: the trades it produced (possibly none)
/// and the order's final state.
#[derive(Debug)]
pub struct MatchOutcome {
    pub trades: SmallVec<[Trade; 4]>,
    pub state: OrderState,
}

/// Per-asset matching core.
///
/// Runs inside the asset's single-writer worker, so it owns the book
/// mutations and the trade sequence outright; the loop is synchronous,
/// bounded by book depth, and performs no I/O.
pub struct Matcher {
    spec: AssetSpec,
    trade_seq: u64,
}

impl Matcher {
    pub fn new(spec: AssetSpec) -> Self {
        Self { spec, trade_seq: 0 }
    }

    pub fn spec(&self) -> &AssetSpec {
        &self.spec
    }

    /// Match an incoming order against the opposite side of the book.
    ///
    /// Walks resting orders in price-time priority while the incoming limit
    /// crosses the best opposite price. Trades execute at the resting
    /// (maker) price. Same-owner resting orders are skipped, never matched.
    /// Any remainder at or above the minimum tradable unit rests in the
    /// book; a sub-unit remainder is absorbed.
    pub fn submit(&mut self, book: &mut OrderBook, incoming: Arc<Order>) -> MatchOutcome {
        let unit = self.spec.min_trade_unit;
        let mut trades: SmallVec<[Trade; 4]> = SmallVec::new();

        loop {
            let taker_remaining = incoming.remaining_quantity();
            if taker_remaining < unit {
                break;
            }

            let maker = match self.next_counterparty(book, &incoming) {
                Some(maker) => maker,
                None => break,
            };

            let maker_remaining = maker.remaining_quantity();
            let mut quantity = round_down_to_unit(taker_remaining.min(maker_remaining), unit);

            // Taking the whole maker keeps a sub-unit tail from surviving
            // the rounding step.
            if taker_remaining >= maker_remaining {
                quantity = maker_remaining;
            }

            if maker.try_fill(quantity) && incoming.try_fill(quantity) {
                trades.push(Trade::new(
                    self.spec.asset_id.clone(),
                    maker.id,
                    incoming.id,
                    maker.limit_price,
                    quantity,
                    self.next_trade_seq(),
                ));
            }

            let maker_left = maker.remaining_quantity();
            if maker_left == Decimal::ZERO {
                let _ = book.remove(&maker.id);
            } else if maker_left < unit {
                // Dust on the resting side: the level is fully consumed
                let _ = book.remove(&maker.id);
                maker.absorb_dust(unit);
            }
        }

        let remaining = incoming.remaining_quantity();
        let state = if remaining == Decimal::ZERO {
            OrderState::Filled
        } else if remaining < unit {
            // Dust on the incoming side never rests
            incoming.absorb_dust(unit);
            incoming.state()
        } else {
            book.insert(Arc::clone(&incoming));
            incoming.state()
        };

        book.debug_assert_uncrossed();

        MatchOutcome { trades, state }
    }

    /// Best-priced, earliest-sequence resting order the incoming order may
    /// trade with. Same-owner orders are passed over in place; they keep
    /// their queue priority.
    fn next_counterparty(&self, book: &OrderBook, incoming: &Order) -> Option<Arc<Order>> {
        for (_, maker) in book.side(incoming.side.opposite()).iter_priority() {
            if !prices_cross(incoming, maker.limit_price) {
                return None;
            }
            if maker.owner == incoming.owner {
                continue; // self-trade prevention
            }
            return Some(maker);
        }
        None
    }

    fn next_trade_seq(&mut self) -> u64 {
        self.trade_seq += 1;
        self.trade_seq
    }
}

/// A buy crosses at or above the book price; a sell at or below.
pub(crate) fn prices_cross(incoming: &Order, book_price: Decimal) -> bool {
    use crate::domain::Side;

    match incoming.side {
        Side::Buy => incoming.limit_price >= book_price,
        Side::Sell => incoming.limit_price <= book_price,
    }
}

fn round_down_to_unit(quantity: Decimal, unit: Decimal) -> Decimal {
    (quantity / unit).floor() * unit
}
