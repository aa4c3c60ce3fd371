// ============================================================================
// Engine Errors
// Error taxonomy for order submission, cancellation and settlement
// ============================================================================

use crate::domain::asset::AssetId;
use crate::domain::batch::BatchId;
use crate::domain::order::state::OrderState;
use crate::domain::order::OrderId;
use rust_decimal::Decimal;
use std::fmt;

/// Rejections raised before an order enters the book.
///
/// Validation is synchronous and local: a rejected order never touches
/// shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The asset is not present in the catalog
    UnknownAsset(AssetId),
    /// Limit price must be strictly positive
    NonPositivePrice,
    /// Quantity must be strictly positive
    NonPositiveQuantity,
    /// Price carries more decimal places than the asset supports
    PricePrecision { max_decimals: u32 },
    /// Quantity is below the asset's minimum tradable unit
    BelowMinimumUnit { minimum: Decimal },
    /// Quantity carries more decimal places than the engine tracks
    QuantityPrecision { max_decimals: u32 },
    /// Price or quantity exceeds the largest magnitude the engine can
    /// represent
    OutOfRange { maximum: Decimal },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownAsset(asset_id) => {
                write!(f, "unknown asset: {}", asset_id)
            },
            ValidationError::NonPositivePrice => write!(f, "limit price must be positive"),
            ValidationError::NonPositiveQuantity => write!(f, "quantity must be positive"),
            ValidationError::PricePrecision { max_decimals } => {
                write!(f, "price exceeds asset precision of {} decimals", max_decimals)
            },
            ValidationError::BelowMinimumUnit { minimum } => {
                write!(f, "quantity is below the minimum tradable unit of {}", minimum)
            },
            ValidationError::QuantityPrecision { max_decimals } => {
                write!(f, "quantity exceeds the supported precision of {} decimals", max_decimals)
            },
            ValidationError::OutOfRange { maximum } => {
                write!(f, "value exceeds the maximum representable magnitude of {}", maximum)
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Infrastructure faults reported by the external settlement ledger.
///
/// These are retriable: a failed commit never unwinds trades that already
/// happened in the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The ledger could not be reached or timed out
    LedgerUnavailable(String),
    /// The ledger refused the batch outright
    CommitRejected(String),
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementError::LedgerUnavailable(detail) => {
                write!(f, "settlement ledger unavailable: {}", detail)
            },
            SettlementError::CommitRejected(detail) => {
                write!(f, "settlement commit rejected: {}", detail)
            },
        }
    }
}

impl std::error::Error for SettlementError {}

/// Top-level error type for the public exchange surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Order rejected before entering the book
    Validation(ValidationError),
    /// Cancel requested by someone other than the order's owner
    Authorization,
    /// Operation targeted an order already in a terminal state
    AlreadyTerminal(OrderState),
    /// No order with this id is known to the engine
    OrderNotFound(OrderId),
    /// No settlement batch with this id is known to the engine
    UnknownBatch(BatchId),
    /// The per-asset worker has shut down and can no longer accept commands
    EngineUnavailable,
    /// Settlement infrastructure fault
    Settlement(SettlementError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(err) => write!(f, "validation failed: {}", err),
            EngineError::Authorization => {
                write!(f, "requester is not the owner of this order")
            },
            EngineError::AlreadyTerminal(state) => {
                write!(f, "order is already terminal ({:?})", state)
            },
            EngineError::OrderNotFound(order_id) => write!(f, "order not found: {}", order_id),
            EngineError::UnknownBatch(batch_id) => {
                write!(f, "settlement batch not found: {}", batch_id)
            },
            EngineError::EngineUnavailable => write!(f, "matching engine is shut down"),
            EngineError::Settlement(err) => write!(f, "settlement failure: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(err) => Some(err),
            EngineError::Settlement(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err)
    }
}

impl From<SettlementError> for EngineError {
    fn from(err: SettlementError) -> Self {
        EngineError::Settlement(err)
    }
}
