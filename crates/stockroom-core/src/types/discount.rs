//! Discount codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::Percent;

/// How the discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is basis points of the purchase amount.
    Percentage,
    /// `value` is a fixed amount in cents.
    FixedAmount,
}

/// The entity dimension a code is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    Global,
    /// Bound to a customer category.
    Category,
    Product,
    Customer,
}

/// A redeemable discount code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiscountCode {
    pub id: String,
    /// Unique, stored upper-case.
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: i64,
    pub scope: DiscountScope,
    pub min_purchase_cents: Option<i64>,
    pub max_discount_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    /// Monotonic, incremented each time the code is applied.
    pub used_count: i64,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub customer_category_id: Option<String>,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DiscountCode {
    pub fn min_purchase(&self) -> Option<Money> {
        self.min_purchase_cents.map(Money::from_cents)
    }

    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount_cents.map(Money::from_cents)
    }

    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }
}

/// Input for creating a discount code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewDiscountCode {
    pub code: String,
    pub description: Option<String>,
    pub discount: DiscountValue,
    pub scope: DiscountScope,
    pub min_purchase: Option<Money>,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<i64>,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    pub customer_category_id: Option<String>,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
}

/// Typed discount value for input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountValue {
    Percentage(Percent),
    FixedAmount(Money),
}

impl DiscountValue {
    pub fn discount_type(&self) -> DiscountType {
        match self {
            DiscountValue::Percentage(_) => DiscountType::Percentage,
            DiscountValue::FixedAmount(_) => DiscountType::FixedAmount,
        }
    }

    /// Raw stored value: basis points or cents.
    pub fn raw(&self) -> i64 {
        match self {
            DiscountValue::Percentage(p) => p.bps(),
            DiscountValue::FixedAmount(m) => m.cents(),
        }
    }
}

/// Result of evaluating a code against a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountValidation {
    pub is_valid: bool,
    pub discount_amount: Money,
    pub message: Option<String>,
}
