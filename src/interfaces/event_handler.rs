// ============================================================================
// Event Handler Interface
// Tagged engine events and the contract for downstream consumers
// ============================================================================

use crate::domain::{AssetId, BatchId, BatchSummary, OrderId, OwnerId, Side, Trade};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the engine for market-data display, portfolio and
/// notification UIs, and settlement export.
///
/// One variant per event type, each carrying its full typed payload, so
/// consumers need no runtime type discovery.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EngineEvent {
    /// Order validated and accepted into the matching path
    OrderPlaced {
        order_id: OrderId,
        asset_id: AssetId,
        owner: OwnerId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Order rejected by validation; it never entered the book
    OrderRejected {
        asset_id: AssetId,
        owner: OwnerId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A match produced a trade
    TradeExecuted {
        trade: Trade,
        timestamp: DateTime<Utc>,
    },

    /// Order partially filled; remainder rests in the book
    OrderPartiallyFilled {
        order_id: OrderId,
        filled_quantity: Decimal,
        remaining_quantity: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Order fully filled
    OrderFilled {
        order_id: OrderId,
        total_filled: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Unfilled remainder cancelled by the owner
    OrderCancelled {
        order_id: OrderId,
        cancelled_quantity: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Unfilled remainder expired (TTL reached)
    OrderExpired {
        order_id: OrderId,
        expired_quantity: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// A new settlement batch started accepting trades
    BatchOpened {
        batch_id: BatchId,
        asset_id: AssetId,
        timestamp: DateTime<Utc>,
    },

    /// Closed batch acknowledged by the external ledger
    BatchCommitted {
        summary: BatchSummary,
        timestamp: DateTime<Utc>,
    },

    /// Commit retries exhausted; operational alert, not data loss
    BatchDegraded {
        batch_id: BatchId,
        asset_id: AssetId,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing engine events.
/// Implementations can handle logging, notifications, market-data fan-out.
pub trait EventHandler: Send + Sync {
    /// Handle a single event
    fn on_event(&self, event: EngineEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<EngineEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: EngineEvent) {
        // Do nothing
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: EngineEvent) {
        tracing::debug!("engine event: {:?}", event);
    }
}

/// Buffering handler that records every event, for tests and backfills.
#[derive(Default)]
pub struct CollectingEventHandler {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventHandler for CollectingEventHandler {
    fn on_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}
