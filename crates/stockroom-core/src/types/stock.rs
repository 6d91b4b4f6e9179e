//! Stock ledger types: inventory rows, movements and transfers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Movement Type
// =============================================================================

/// What a movement does to stock once completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum StockEffect {
    Increase,
    Decrease,
}

/// Kind of stock movement.
///
/// ```text
/// IN            goods received (purchase receipt)       +qty
/// OUT           goods leaving (sale confirmation)       -qty
/// TRANSFER_OUT  leaving the source branch of a transfer -qty
/// TRANSFER_IN   arriving at the target branch           +qty
/// ADJUSTMENT    manual correction after a count         +qty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    TransferOut,
    TransferIn,
    Adjustment,
}

impl MovementType {
    pub const ALL: [MovementType; 5] = [
        MovementType::In,
        MovementType::Out,
        MovementType::TransferOut,
        MovementType::TransferIn,
        MovementType::Adjustment,
    ];

    pub fn effect(self) -> StockEffect {
        match self {
            MovementType::In | MovementType::TransferIn | MovementType::Adjustment => {
                StockEffect::Increase
            }
            MovementType::Out | MovementType::TransferOut => StockEffect::Decrease,
        }
    }

    pub fn is_transfer(self) -> bool {
        matches!(self, MovementType::TransferOut | MovementType::TransferIn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Movement Status
// =============================================================================

/// Lifecycle of a movement. Only `Completed` movements have touched stock.
///
/// ```text
/// Pending ──complete──► Completed   (stock effect applied, irreversible)
///    │
///    └────cancel──────► Cancelled   (no stock effect ever)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementStatus::Pending => "pending",
            MovementStatus::Completed => "completed",
            MovementStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Materialized stock level of one product at one branch.
///
/// Only the stock ledger writes `stock_milli`; `version` is bumped on every
/// stock mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Inventory {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    pub stock_milli: i64,
    pub min_stock_milli: i64,
    pub max_stock_milli: Option<i64>,
    #[ts(as = "Option<String>")]
    pub last_movement_at: Option<DateTime<Utc>>,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Inventory {
    #[inline]
    pub fn stock(&self) -> Quantity {
        Quantity::from_milli(self.stock_milli)
    }

    #[inline]
    pub fn min_stock(&self) -> Quantity {
        Quantity::from_milli(self.min_stock_milli)
    }

    #[inline]
    pub fn max_stock(&self) -> Option<Quantity> {
        self.max_stock_milli.map(Quantity::from_milli)
    }

    pub fn limits(&self) -> StockLimits {
        StockLimits {
            min_stock: self.min_stock(),
            max_stock: self.max_stock(),
        }
    }

    /// In stock but at or below the reorder level.
    pub fn is_low_stock(&self) -> bool {
        self.stock().is_positive() && self.stock() <= self.min_stock()
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock().is_zero()
    }
}

/// Reorder limits for an inventory row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLimits {
    pub min_stock: Quantity,
    pub max_stock: Option<Quantity>,
}

/// Counters over a branch's (or every branch's) inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryStats {
    pub total_products: i64,
    pub low_stock: i64,
    pub out_of_stock: i64,
    /// Σ stock × product cost.
    pub total_value: Money,
}

// =============================================================================
// Movement
// =============================================================================

/// An append-only record of a stock change at a product×branch.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Movement {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    /// Set when the movement is applied.
    pub inventory_id: Option<String>,
    pub quantity_milli: i64,
    pub movement_type: MovementType,
    pub status: MovementStatus,
    /// Shared by the two halves of a transfer.
    pub reference_id: Option<String>,
    pub source_branch_id: Option<String>,
    pub target_branch_id: Option<String>,
    /// Cost snapshot at the time the movement was recorded.
    pub unit_cost_cents: i64,
    pub total_cost_cents: i64,
    #[ts(as = "String")]
    pub movement_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Movement {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    #[inline]
    pub fn total_cost(&self) -> Money {
        Money::from_cents(self.total_cost_cents)
    }
}

/// Input for recording a movement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewMovement {
    pub product_id: String,
    pub branch_id: String,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    /// `Completed` applies the stock effect immediately. Defaults to pending.
    pub status: MovementStatus,
    /// Defaults to the product's cost.
    pub unit_cost: Option<Money>,
    pub reference_id: Option<String>,
    pub source_branch_id: Option<String>,
    pub target_branch_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub movement_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl NewMovement {
    /// A pending, non-transfer movement.
    pub fn new(
        product_id: impl Into<String>,
        branch_id: impl Into<String>,
        movement_type: MovementType,
        quantity: Quantity,
    ) -> Self {
        NewMovement {
            product_id: product_id.into(),
            branch_id: branch_id.into(),
            movement_type,
            quantity,
            status: MovementStatus::Pending,
            unit_cost: None,
            reference_id: None,
            source_branch_id: None,
            target_branch_id: None,
            movement_date: None,
            notes: None,
        }
    }

    /// Same movement, applied on creation.
    pub fn completed(mut self) -> Self {
        self.status = MovementStatus::Completed;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }
}

/// Edits to a PENDING movement. `None` leaves the field unchanged.
///
/// Quantity, type and branches are fixed once recorded; a different
/// movement is recorded instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementUpdate {
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub movement_date: Option<DateTime<Utc>>,
    /// Re-snapshots `total_cost` as `unit_cost × quantity`.
    pub unit_cost: Option<Money>,
}

/// Per-type movement count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementTypeCount {
    pub movement_type: MovementType,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub cancelled: i64,
    pub by_type: Vec<MovementTypeCount>,
}

// =============================================================================
// Transfer
// =============================================================================

/// Input for moving stock between two branches.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransfer {
    pub product_id: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub quantity: Quantity,
    pub notes: Option<String>,
}

/// The two linked halves of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transfer {
    pub reference_id: String,
    /// TRANSFER_OUT at the source branch.
    pub outbound: Movement,
    /// TRANSFER_IN at the target branch.
    pub inbound: Movement,
}

impl Transfer {
    pub fn is_completed(&self) -> bool {
        self.outbound.status == MovementStatus::Completed
            && self.inbound.status == MovementStatus::Completed
    }
}
