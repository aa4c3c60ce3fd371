// ============================================================================
// Trade Domain Model
// ============================================================================

use super::asset::AssetId;
use super::batch::BatchId;
use super::order::OrderId;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeId(Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A matched execution between a resting (maker) and incoming (taker) order.
///
/// Created atomically by the matcher at the moment of a match and immutable
/// thereafter; ownership moves to the settlement batcher, which assigns the
/// batch id and, at commit time, the taker fee.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    pub id: TradeId,
    pub asset_id: AssetId,

    /// Order that was resting in the book
    pub maker_order_id: OrderId,

    /// Incoming order that crossed it
    pub taker_order_id: OrderId,

    /// Execution price (always the maker's limit price)
    pub price: Decimal,

    /// Executed quantity
    pub quantity: Decimal,

    pub executed_at: DateTime<Utc>,

    /// Monotonic execution sequence within the asset
    pub executed_seq: u64,

    /// Owning settlement batch, assigned when the batcher takes the trade
    pub settlement_batch_id: Option<BatchId>,

    /// Taker fee, computed when the owning batch closes
    pub fee: Option<Decimal>,
}

impl Trade {
    pub fn new(
        asset_id: AssetId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        price: Decimal,
        quantity: Decimal,
        executed_seq: u64,
    ) -> Self {
        Self {
            id: TradeId::new(),
            asset_id,
            maker_order_id,
            taker_order_id,
            price,
            quantity,
            executed_at: Utc::now(),
            executed_seq,
            settlement_batch_id: None,
            fee: None,
        }
    }

    /// Notional value of the trade (price × quantity).
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Taker fee at a basis-point rate, rounded half-up to the quote
    /// currency's smallest unit.
    pub fn taker_fee(&self, fee_bps: u32, price_decimals: u32) -> Decimal {
        (self.notional() * Decimal::from(fee_bps) / Decimal::from(10_000u32))
            .round_dp_with_strategy(price_decimals, RoundingStrategy::MidpointAwayFromZero)
    }
}
