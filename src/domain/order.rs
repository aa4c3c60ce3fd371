// ============================================================================
// Order Domain Model
// ============================================================================

use super::asset::AssetId;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of the account that placed an order, as issued by the external
/// auth/session service. The engine only compares owners, it never
/// authenticates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// ============================================================================
// Quantity Scaling
// ============================================================================

/// Internal fixed scale for atomic quantity storage (micro-units).
pub(crate) const RAW_SCALE: i64 = 1_000_000;

/// Decimal places representable at the internal scale.
pub(crate) const RAW_DECIMALS: u32 = 6;

/// Largest price or quantity representable at the internal scale.
pub(crate) fn max_raw_value() -> Decimal {
    raw_to_decimal(i64::MAX)
}

/// Convert to the internal scale, rejecting values that would overflow the
/// raw mantissa or lose sub-micro precision.
pub(crate) fn try_decimal_to_raw(value: Decimal) -> Option<i64> {
    let scaled = value.checked_mul(Decimal::from(RAW_SCALE))?;
    if scaled != scaled.trunc() {
        return None;
    }
    scaled.to_i64()
}

/// Internal-scale conversion for values validation has already proven
/// representable.
pub(crate) fn decimal_to_raw(value: Decimal) -> i64 {
    try_decimal_to_raw(value).unwrap_or(0)
}

pub(crate) fn raw_to_decimal(raw: i64) -> Decimal {
    Decimal::from(raw) / Decimal::from(RAW_SCALE)
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    /// Lifecycle states. Transitions are monotonic: no edge leaves a
    /// terminal state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u8)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderState {
        Pending = 0,
        PartiallyFilled = 1,
        Filled = 2,
        Cancelled = 3,
        Expired = 4,
    }

    impl OrderState {
        pub fn from_u8(val: u8) -> Self {
            match val {
                0 => OrderState::Pending,
                1 => OrderState::PartiallyFilled,
                2 => OrderState::Filled,
                3 => OrderState::Cancelled,
                _ => OrderState::Expired,
            }
        }

        pub fn is_terminal(&self) -> bool {
            matches!(
                self,
                OrderState::Filled | OrderState::Cancelled | OrderState::Expired
            )
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderState::Pending | OrderState::PartiallyFilled)
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy)]
    pub enum OrderStateTransition {
        PartialFill,
        Fill,
        Cancel,
        Expire,
    }

    impl OrderState {
        pub fn transition(&self, transition: OrderStateTransition) -> Result<OrderState, String> {
            match (self, transition) {
                (OrderState::Pending, OrderStateTransition::PartialFill) => {
                    Ok(OrderState::PartiallyFilled)
                },
                (OrderState::Pending, OrderStateTransition::Fill) => Ok(OrderState::Filled),
                (OrderState::Pending, OrderStateTransition::Cancel) => Ok(OrderState::Cancelled),
                (OrderState::Pending, OrderStateTransition::Expire) => Ok(OrderState::Expired),

                (OrderState::PartiallyFilled, OrderStateTransition::PartialFill) => {
                    Ok(OrderState::PartiallyFilled)
                },
                (OrderState::PartiallyFilled, OrderStateTransition::Fill) => Ok(OrderState::Filled),
                (OrderState::PartiallyFilled, OrderStateTransition::Cancel) => {
                    Ok(OrderState::Cancelled)
                },
                (OrderState::PartiallyFilled, OrderStateTransition::Expire) => {
                    Ok(OrderState::Expired)
                },

                _ => Err(format!(
                    "Invalid transition from {:?} via {:?}",
                    self, transition
                )),
            }
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// A user's trading intent: immutable identity, atomically mutable state.
///
/// Fill bookkeeping and lifecycle state live in atomics so that shared
/// `Arc<Order>` handles (book, order index, event payloads) observe a
/// consistent view without locking. All mutation still goes through the
/// per-asset serialized command path.
#[derive(Debug)]
pub struct Order {
    pub id: OrderId,
    pub asset_id: AssetId,
    pub owner: OwnerId,
    pub side: Side,
    pub limit_price: Decimal,
    pub quantity: Decimal,
    pub submitted_at: DateTime<Utc>,
    /// TTL deadline; the asset worker expires the order past this instant
    pub expires_at: Option<DateTime<Utc>>,

    // Atomic fields (raw micro-unit quantities)
    filled_quantity: AtomicI64,
    remaining_quantity: AtomicI64,
    state: AtomicU8,
    sequence: AtomicU64,
}

impl Order {
    pub fn new(
        asset_id: AssetId,
        owner: OwnerId,
        side: Side,
        limit_price: Decimal,
        quantity: Decimal,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            asset_id,
            owner,
            side,
            limit_price,
            quantity,
            submitted_at: Utc::now(),
            expires_at,
            filled_quantity: AtomicI64::new(0),
            remaining_quantity: AtomicI64::new(decimal_to_raw(quantity)),
            state: AtomicU8::new(state::OrderState::Pending as u8),
            sequence: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Atomic Getters
    // ========================================================================

    pub fn filled_quantity(&self) -> Decimal {
        raw_to_decimal(self.filled_quantity.load(Ordering::Acquire))
    }

    pub fn remaining_quantity(&self) -> Decimal {
        raw_to_decimal(self.remaining_quantity.load(Ordering::Acquire))
    }

    pub fn state(&self) -> state::OrderState {
        state::OrderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    // ========================================================================
    // Atomic Operations
    // ========================================================================

    /// Atomically fill a quantity of this order.
    /// Returns false if the remaining quantity is insufficient (overfill
    /// protection).
    pub fn try_fill(&self, quantity: Decimal) -> bool {
        let quantity_raw = decimal_to_raw(quantity);

        loop {
            let current_remaining = self.remaining_quantity.load(Ordering::Acquire);

            if current_remaining < quantity_raw {
                return false;
            }

            let new_remaining = current_remaining - quantity_raw;

            if self
                .remaining_quantity
                .compare_exchange(
                    current_remaining,
                    new_remaining,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.filled_quantity
                    .fetch_add(quantity_raw, Ordering::AcqRel);

                if new_remaining == 0 {
                    self.state
                        .store(state::OrderState::Filled as u8, Ordering::Release);
                } else {
                    self.state
                        .store(state::OrderState::PartiallyFilled as u8, Ordering::Release);
                }

                return true;
            }
            // CAS failed, retry
        }
    }

    /// Fold a sub-unit residual into the filled quantity and close the order.
    ///
    /// Called by the matcher when what remains is below the asset's minimum
    /// tradable unit: the sliver is absorbed instead of resting unmatchable.
    /// Returns false if the remainder is zero or still tradable.
    pub fn absorb_dust(&self, min_trade_unit: Decimal) -> bool {
        let unit_raw = decimal_to_raw(min_trade_unit);

        loop {
            let current_remaining = self.remaining_quantity.load(Ordering::Acquire);

            if current_remaining == 0 || current_remaining >= unit_raw {
                return false;
            }

            if self
                .remaining_quantity
                .compare_exchange(current_remaining, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.filled_quantity
                    .fetch_add(current_remaining, Ordering::AcqRel);
                self.state
                    .store(state::OrderState::Filled as u8, Ordering::Release);
                return true;
            }
        }
    }

    /// Atomically cancel this order.
    /// Returns true if successfully cancelled.
    pub fn try_cancel(&self) -> bool {
        self.try_terminate(state::OrderState::Cancelled)
    }

    /// Atomically expire this order (TTL reached).
    pub fn try_expire(&self) -> bool {
        self.try_terminate(state::OrderState::Expired)
    }

    fn try_terminate(&self, terminal: state::OrderState) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);

            if !state::OrderState::from_u8(current).can_be_cancelled() {
                return false;
            }

            if self
                .state
                .compare_exchange(current, terminal as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Set the submission sequence number (assigned by the asset worker).
    pub fn set_sequence(&self, seq: u64) {
        self.sequence.store(seq, Ordering::Release);
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|deadline| deadline <= now).unwrap_or(false)
    }
}

impl Clone for Order {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            asset_id: self.asset_id.clone(),
            owner: self.owner.clone(),
            side: self.side,
            limit_price: self.limit_price,
            quantity: self.quantity,
            submitted_at: self.submitted_at,
            expires_at: self.expires_at,
            filled_quantity: AtomicI64::new(self.filled_quantity.load(Ordering::Acquire)),
            remaining_quantity: AtomicI64::new(self.remaining_quantity.load(Ordering::Acquire)),
            state: AtomicU8::new(self.state.load(Ordering::Acquire)),
            sequence: AtomicU64::new(self.sequence.load(Ordering::Acquire)),
        }
    }
}
