//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  catalog   Product, Category, Unit, Branch                             │
//! │  party     Supplier, Customer, CustomerCategory, PaymentMethod         │
//! │  stock     Inventory, Movement, Transfer (+ status/type enums)         │
//! │  order     Purchase, Sale, OrderLine, Payment, aggregates              │
//! │  discount  DiscountCode, DiscountValidation                            │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Percent      │   │    Money        │   │   Quantity      │       │
//! │  │  bps (i64)      │   │  cents (i64)    │   │  milli (i64)    │       │
//! │  │  1200 = 12%     │   │  8624 = 86.24   │   │  2500 = 2.5     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Columns
//! Entity structs mirror their table rows: amounts are `*_cents`, quantities
//! `*_milli` and rates `*_bps`, each with a typed accessor. With the `sqlx`
//! feature they derive `FromRow` and the enums derive `sqlx::Type`.

pub mod catalog;
pub mod discount;
pub mod order;
pub mod party;
pub mod stock;

pub use catalog::*;
pub use discount::*;
pub use order::*;
pub use party::*;
pub use stock::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Percent
// =============================================================================

/// A percentage in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000, so 12% is 1200 and 8.25% is 825.
/// Line discounts, tax rates and discount codes all use it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percent(i64);

impl Percent {
    /// 100%.
    pub const FULL: Percent = Percent(10_000);

    #[inline]
    pub const fn from_bps(bps: i64) -> Self {
        Percent(bps)
    }

    /// Whole percentage points: `from_whole(12)` is 12%.
    #[inline]
    pub const fn from_whole(points: i64) -> Self {
        Percent(points * 100)
    }

    #[inline]
    pub const fn bps(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percent(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// `12%`, `8.25%`, `0.5%`.
impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = (self.0 % 100).abs();
        match frac {
            0 => write!(f, "{}%", whole),
            f2 if f2 % 10 == 0 => write!(f, "{}.{}%", whole, f2 / 10),
            f2 => write!(f, "{}.{:02}%", whole, f2),
        }
    }
}
