// ============================================================================
// Asset Metadata
// Precision and minimum-unit metadata sourced from the property catalog
// ============================================================================

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a tokenized asset (one order book per asset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Trading metadata for a single asset.
///
/// `price_decimals` is the precision of the quote currency (fees are rounded
/// to this many places); `min_trade_unit` is the smallest tradable token
/// fraction. Residual quantities below the unit are absorbed during matching
/// rather than left resting as unmatchable slivers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssetSpec {
    pub asset_id: AssetId,
    pub price_decimals: u32,
    pub min_trade_unit: Decimal,
}

impl AssetSpec {
    /// Panics if the unit is not positive or is finer than the micro-unit
    /// scale the engine tracks fills at; such a unit would mis-round every
    /// fill against it.
    pub fn new(asset_id: AssetId, price_decimals: u32, min_trade_unit: Decimal) -> Self {
        assert!(
            min_trade_unit > Decimal::ZERO
                && min_trade_unit.normalize().scale() <= crate::domain::order::RAW_DECIMALS,
            "min_trade_unit must be positive and representable in micro-units"
        );
        Self {
            asset_id,
            price_decimals,
            min_trade_unit,
        }
    }
}

/// Boundary to the external property catalog.
///
/// The engine only needs existence plus precision metadata; listing CRUD
/// stays on the other side of this trait.
pub trait AssetCatalog: Send + Sync {
    fn lookup(&self, asset_id: &AssetId) -> Option<AssetSpec>;
}

/// Fixed in-memory catalog for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    assets: HashMap<AssetId, AssetSpec>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, spec: AssetSpec) -> Self {
        self.assets.insert(spec.asset_id.clone(), spec);
        self
    }
}

impl AssetCatalog for StaticCatalog {
    fn lookup(&self, asset_id: &AssetId) -> Option<AssetSpec> {
        self.assets.get(asset_id).cloned()
    }
}
