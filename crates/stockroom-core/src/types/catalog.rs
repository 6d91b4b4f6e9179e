//! Catalog master data: products, categories, units and branches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Product
// =============================================================================

/// A product that can be bought, stocked and sold.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    pub description: Option<String>,

    /// Stock Keeping Unit - unique business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.), unique when present.
    pub barcode: Option<String>,

    /// Purchase cost in cents. Snapshotted onto outbound movements.
    pub cost_cents: i64,

    /// Selling price in cents. Never lower than `cost_cents`.
    pub price_cents: i64,

    /// Opaque reference to the product image in external storage.
    pub image_url: Option<String>,

    pub category_id: Option<String>,

    pub unit_id: Option<String>,

    /// Whether stock levels are tracked for this product.
    pub manage_stock: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Gross margin per unit.
    #[inline]
    pub fn margin(&self) -> Money {
        self.price() - self.cost()
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub cost: Money,
    pub price: Money,
    pub image_url: Option<String>,
    pub category_id: Option<String>,
    pub unit_id: Option<String>,
    pub manage_stock: bool,
}

impl NewProduct {
    /// Minimal input with stock management enabled.
    pub fn new(name: impl Into<String>, sku: impl Into<String>, cost: Money, price: Money) -> Self {
        NewProduct {
            name: name.into(),
            description: None,
            sku: sku.into(),
            barcode: None,
            cost,
            price,
            image_url: None,
            category_id: None,
            unit_id: None,
            manage_stock: true,
        }
    }
}

/// Opening stock for a new product at one branch.
///
/// Recorded as a completed ADJUSTMENT, so the movement ledger stays the
/// only writer of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InitialStock {
    pub branch_id: String,
    pub quantity: Quantity,
}

impl InitialStock {
    pub fn new(branch_id: impl Into<String>, quantity: Quantity) -> Self {
        InitialStock {
            branch_id: branch_id.into(),
            quantity,
        }
    }
}

/// Partial update of a product. `None` leaves the field unchanged.
///
/// Price and cost are validated on the merged result, so raising the cost
/// above the stored price is rejected the same way as on create.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub barcode: Option<String>,
    pub cost: Option<Money>,
    pub price: Option<Money>,
    pub image_url: Option<String>,
    pub category_id: Option<String>,
    pub unit_id: Option<String>,
    pub manage_stock: Option<bool>,
}

// =============================================================================
// Category / Unit
// =============================================================================

/// Product category.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Unit of measure (piece, kg, litre).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Branch
// =============================================================================

/// A physical location holding stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    /// Unique.
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBranch {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl NewBranch {
    pub fn named(name: impl Into<String>) -> Self {
        NewBranch {
            name: name.into(),
            ..Default::default()
        }
    }
}
