//! # Order Line Engine
//!
//! Pure computation of line and order amounts, shared by purchases and sales.
//!
//! ## Line Math
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  qty=3, unit_price=10.00, discount=10%, tax=12%                         │
//! │                                                                         │
//! │  subtotal       = 3 × 10.00            = 30.00                          │
//! │  discount       = 30.00 × 10%          =  3.00                          │
//! │  after_discount = 30.00 − 3.00         = 27.00                          │
//! │  tax            = 27.00 × 12%          =  3.24                          │
//! │  total          = 27.00 + 3.24         = 30.24                          │
//! │                                                                         │
//! │  Each product is rounded to the cent once, where it is computed, so    │
//! │  total == subtotal − discount + tax holds exactly on stored values.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Aggregation
//! ```text
//! subtotal = Σ line.subtotal
//! discount = Σ line.discount + order-level discounts (manual, code)
//! tax      = Σ line.tax
//! total    = subtotal − discount + tax
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::Percent;
use crate::validation::{validate_percent, validate_positive_quantity, validate_non_negative_money};

// =============================================================================
// Line Input / Output
// =============================================================================

/// One requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineInput {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount: Percent,
    /// Explicit discount amount; replaces `discount` × subtotal when set.
    pub discount_override: Option<Money>,
    pub tax: Percent,
}

impl LineInput {
    /// A line without discount or tax.
    pub fn new(product_id: impl Into<String>, quantity: Quantity, unit_price: Money) -> Self {
        LineInput {
            product_id: product_id.into(),
            quantity,
            unit_price,
            discount: Percent::zero(),
            discount_override: None,
            tax: Percent::zero(),
        }
    }

    pub fn with_discount(mut self, discount: Percent) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_discount_amount(mut self, amount: Money) -> Self {
        self.discount_override = Some(amount);
        self
    }

    pub fn with_tax(mut self, tax: Percent) -> Self {
        self.tax = tax;
        self
    }

    /// Validates the input and computes its amounts.
    pub fn amounts(&self) -> CoreResult<LineAmounts> {
        validate_positive_quantity(self.quantity)?;
        validate_non_negative_money("unit_price", self.unit_price)?;
        validate_percent("discount", self.discount)?;
        validate_percent("tax", self.tax)?;

        match self.discount_override {
            Some(amount) => compute_line_with_discount(self.quantity, self.unit_price, amount, self.tax),
            None => Ok(compute_line(self.quantity, self.unit_price, self.discount, self.tax)),
        }
    }
}

/// Computed amounts of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl LineAmounts {
    pub fn after_discount(&self) -> Money {
        self.subtotal - self.discount
    }
}

/// Computes a line from a discount percentage.
///
/// ## Example
/// ```rust
/// use stockroom_core::lines::compute_line;
/// use stockroom_core::{Money, Percent, Quantity};
///
/// let line = compute_line(
///     Quantity::from_units(3),
///     Money::from_cents(1000),
///     Percent::from_whole(10),
///     Percent::from_whole(12),
/// );
/// assert_eq!(line.subtotal.cents(), 3000);
/// assert_eq!(line.discount.cents(), 300);
/// assert_eq!(line.tax.cents(), 324);
/// assert_eq!(line.total.cents(), 3024);
/// ```
pub fn compute_line(
    quantity: Quantity,
    unit_price: Money,
    discount_pct: Percent,
    tax_pct: Percent,
) -> LineAmounts {
    let subtotal = unit_price.times(quantity);
    let discount = subtotal.percent_of(discount_pct);
    finish_line(subtotal, discount, tax_pct)
}

/// Computes a line with an explicit discount amount (0 ≤ discount ≤ subtotal).
pub fn compute_line_with_discount(
    quantity: Quantity,
    unit_price: Money,
    discount: Money,
    tax_pct: Percent,
) -> CoreResult<LineAmounts> {
    let subtotal = unit_price.times(quantity);
    if discount.is_negative() || discount > subtotal {
        return Err(ValidationError::OutOfRange {
            field: "discount_amount".to_string(),
            min: 0,
            max: subtotal.cents(),
        }
        .into());
    }
    Ok(finish_line(subtotal, discount, tax_pct))
}

fn finish_line(subtotal: Money, discount: Money, tax_pct: Percent) -> LineAmounts {
    let after_discount = subtotal - discount;
    let tax = after_discount.percent_of(tax_pct);
    LineAmounts {
        subtotal,
        discount,
        tax,
        total: after_discount + tax,
    }
}

// =============================================================================
// Order-Level Discounts
// =============================================================================

/// How a manual order discount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ManualDiscountKind {
    /// `value` is basis points of the order subtotal.
    Percent,
    /// `value` is cents.
    Amount,
}

/// A discount granted on the whole order by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManualDiscount {
    pub kind: ManualDiscountKind,
    pub value: i64,
    pub reason: Option<String>,
}

impl ManualDiscount {
    pub fn percent(rate: Percent, reason: impl Into<String>) -> Self {
        ManualDiscount {
            kind: ManualDiscountKind::Percent,
            value: rate.bps(),
            reason: Some(reason.into()),
        }
    }

    pub fn amount(amount: Money, reason: impl Into<String>) -> Self {
        ManualDiscount {
            kind: ManualDiscountKind::Amount,
            value: amount.cents(),
            reason: Some(reason.into()),
        }
    }

    /// Amount this discount takes off an order with the given subtotal.
    pub fn amount_for(&self, subtotal: Money) -> CoreResult<Money> {
        match self.kind {
            ManualDiscountKind::Percent => {
                let rate = Percent::from_bps(self.value);
                validate_percent("manual discount", rate)?;
                Ok(subtotal.percent_of(rate))
            }
            ManualDiscountKind::Amount => {
                let amount = Money::from_cents(self.value);
                validate_non_negative_money("manual discount", amount)?;
                Ok(amount)
            }
        }
    }
}

// =============================================================================
// Order Totals
// =============================================================================

/// Aggregated order amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    /// Line discounts plus order-level discounts.
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Aggregates computed lines plus any order-level discount.
///
/// Rejects totals that would go negative: an order can be discounted down
/// to zero but never below.
pub fn aggregate(lines: &[LineAmounts], extra_discount: Money) -> CoreResult<OrderTotals> {
    let subtotal: Money = lines.iter().map(|l| l.subtotal).sum();
    let line_discount: Money = lines.iter().map(|l| l.discount).sum();
    let tax: Money = lines.iter().map(|l| l.tax).sum();

    if extra_discount.is_negative() {
        return Err(ValidationError::Negative {
            field: "order discount".to_string(),
        }
        .into());
    }

    let discount = line_discount + extra_discount;
    let total = subtotal - discount + tax;

    if total.is_negative() {
        return Err(ValidationError::Inconsistent {
            field: "discount".to_string(),
            reason: format!("discount {} exceeds order amount {}", discount, subtotal + tax),
        }
        .into());
    }

    Ok(OrderTotals {
        subtotal,
        discount,
        tax,
        total,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
