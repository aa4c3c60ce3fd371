// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod asset;
pub mod batch;
pub mod order;
pub mod order_book;
pub mod trade;

pub use asset::{AssetCatalog, AssetId, AssetSpec, StaticCatalog};
pub use batch::{BatchId, BatchStatus, BatchSummary, SettlementBatch};
pub use order::{Order, OrderId, OwnerId, Side};
pub use order_book::{BookKey, BookSide, BookSnapshot, OrderBook};
pub use trade::{Trade, TradeId};

// Re-export state machine
pub use order::state::{OrderState, OrderStateTransition};
