// ============================================================================
// Settlement Batch Domain Model
// ============================================================================

use super::asset::AssetId;
use super::trade::{Trade, TradeId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BatchStatus {
    /// Accepting trades from the matcher
    Open,
    /// Frozen trade set, commit in flight (possibly retrying)
    Closing,
    /// Acknowledged by the external ledger
    Committed,
    /// Commit retries exhausted; trades stay valid and queryable
    Degraded,
}

/// A time-boxed group of trades committed together to the external ledger.
///
/// Every trade belongs to exactly one batch; the trade set is frozen once
/// the batch leaves `Open`.
#[derive(Debug, Clone)]
pub struct SettlementBatch {
    pub id: BatchId,
    pub asset_id: AssetId,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    trades: Vec<Trade>,
}

impl SettlementBatch {
    pub fn open(asset_id: AssetId) -> Self {
        Self {
            id: BatchId::new(),
            asset_id,
            opened_at: Utc::now(),
            closed_at: None,
            status: BatchStatus::Open,
            trades: Vec::new(),
        }
    }

    /// Take ownership of a trade, stamping it with this batch's id.
    ///
    /// Panics if the batch is no longer open; the batcher rotates batches
    /// before handing the closed one to the commit worker, so the matcher
    /// can never reach a frozen batch.
    pub fn push(&mut self, mut trade: Trade) {
        assert_eq!(
            self.status,
            BatchStatus::Open,
            "trade pushed into a frozen batch"
        );
        trade.settlement_batch_id = Some(self.id);
        self.trades.push(trade);
    }

    /// Freeze the trade set. No further trades may join.
    pub fn close(&mut self) {
        self.status = BatchStatus::Closing;
        self.closed_at = Some(Utc::now());
    }

    /// Compute per-trade taker fees (commit time, not match time).
    pub fn compute_fees(&mut self, fee_bps: u32, price_decimals: u32) {
        for trade in &mut self.trades {
            trade.fee = Some(trade.taker_fee(fee_bps, price_decimals));
        }
    }

    pub fn mark_committed(&mut self) {
        self.status = BatchStatus::Committed;
    }

    pub fn mark_degraded(&mut self) {
        self.status = BatchStatus::Degraded;
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn total_fees(&self) -> Decimal {
        self.trades.iter().filter_map(|trade| trade.fee).sum()
    }

    /// Per-batch summary handed to the ledger and to downstream consumers
    /// (regulatory export, notifications).
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.id,
            asset_id: self.asset_id.clone(),
            trade_ids: self.trades.iter().map(|trade| trade.id).collect(),
            total_fees: self.total_fees(),
            closed_at: self.closed_at,
        }
    }
}

/// Condensed view of a closed batch: the only data the core hands to the
/// downstream ledger/regulatory subsystem.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub asset_id: AssetId,
    pub trade_ids: Vec<TradeId>,
    pub total_fees: Decimal,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderId;

    fn trade(price: i64, quantity: i64) -> Trade {
        Trade::new(
            AssetId::new("PROP-001"),
            OrderId::new(),
            OrderId::new(),
            Decimal::from(price),
            Decimal::from(quantity),
            1,
        )
    }

    #[test]
    fn test_push_assigns_batch_id() {
        let mut batch = SettlementBatch::open(AssetId::new("PROP-001"));
        batch.push(trade(100, 2));

        assert_eq!(batch.trade_count(), 1);
        assert_eq!(batch.trades()[0].settlement_batch_id, Some(batch.id));
    }

    #[test]
    #[should_panic(expected = "frozen batch")]
    fn test_push_after_close_panics() {
        let mut batch = SettlementBatch::open(AssetId::new("PROP-001"));
        batch.close();
        batch.push(trade(100, 2));
    }

    #[test]
    fn test_fees_computed_at_close() {
        let mut batch = SettlementBatch::open(AssetId::new("PROP-001"));
        batch.push(trade(100, 2)); // notional 200
        batch.push(trade(50, 1)); // notional 50
        batch.close();
        batch.compute_fees(25, 2); // 0.50 + 0.13 (0.125 rounds up)

        assert_eq!(batch.total_fees(), Decimal::new(63, 2));

        let summary = batch.summary();
        assert_eq!(summary.trade_ids.len(), 2);
        assert_eq!(summary.total_fees, Decimal::new(63, 2));
    }
}
