// ============================================================================
// Order Lifecycle
// Pre-book validation plus the serialized cancel/expire paths
// ============================================================================

use crate::domain::order::{max_raw_value, try_decimal_to_raw, RAW_DECIMALS};
use crate::domain::{AssetSpec, Order, OrderBook, OwnerId};
use crate::errors::{EngineError, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Validate an order before it touches any shared state.
///
/// A failed validation has no side effects: the order never enters the
/// book.
pub(crate) fn validate(
    spec: &AssetSpec,
    price: Decimal,
    quantity: Decimal,
) -> Result<(), ValidationError> {
    if price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice);
    }
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity);
    }
    if price.round_dp(spec.price_decimals) != price {
        return Err(ValidationError::PricePrecision {
            max_decimals: spec.price_decimals,
        });
    }
    if quantity < spec.min_trade_unit {
        return Err(ValidationError::BelowMinimumUnit {
            minimum: spec.min_trade_unit,
        });
    }
    if quantity.normalize().scale() > RAW_DECIMALS {
        return Err(ValidationError::QuantityPrecision {
            max_decimals: RAW_DECIMALS,
        });
    }
    // Both values must fit the engine's fixed-point mantissa; anything
    // larger would wrap to a zero remainder and vanish from the book
    if try_decimal_to_raw(quantity).is_none() || try_decimal_to_raw(price).is_none() {
        return Err(ValidationError::OutOfRange {
            maximum: max_raw_value(),
        });
    }
    Ok(())
}

/// Cancel the unfilled remainder of an order.
///
/// Runs on the per-asset serialized path, so a cancel racing a match for the
/// same order resolves deterministically: whichever command is processed
/// first wins, and a cancel that loses sees the terminal state. Returns the
/// cancelled quantity.
pub(crate) fn cancel(
    book: &mut OrderBook,
    order: &Arc<Order>,
    requester: &OwnerId,
) -> Result<Decimal, EngineError> {
    if order.owner != *requester {
        return Err(EngineError::Authorization);
    }

    let state = order.state();
    if state.is_terminal() {
        return Err(EngineError::AlreadyTerminal(state));
    }

    if !order.try_cancel() {
        return Err(EngineError::AlreadyTerminal(order.state()));
    }

    // Already-produced fills stay untouched; only the remainder leaves the book
    let _ = book.remove(&order.id);
    Ok(order.remaining_quantity())
}

/// Expire every resting order whose TTL deadline has passed.
///
/// Driven from the same serialized path as cancel, so expiry can never race
/// a match non-deterministically. Returns the expired orders with their
/// released quantities.
pub(crate) fn expire_due(
    book: &mut OrderBook,
    now: DateTime<Utc>,
) -> Vec<(Arc<Order>, Decimal)> {
    let mut expired = Vec::new();

    for order in book.expired_orders(now) {
        if order.try_expire() {
            let _ = book.remove(&order.id);
            expired.push((Arc::clone(&order), order.remaining_quantity()));
        }
    }

    expired
}
