//! # Discount Code Evaluation
//!
//! Decides whether a code applies to a purchase and how much it is worth.
//!
//! ## Check Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  evaluate(code, ctx)                                                    │
//! │       │                                                                 │
//! │       ├── 1. code exists?                    → NotFound                │
//! │       ├── 2. is_active?                      → Inactive                │
//! │       ├── 3. valid_from ≤ now ≤ valid_until? → NotYetValid / Expired   │
//! │       ├── 4. used_count < usage_limit?       → UsageLimitReached       │
//! │       ├── 5. amount ≥ min_purchase?          → BelowMinimumPurchase    │
//! │       ├── 6. scope matches?                  → Customer/Product errors │
//! │       │                                                                 │
//! │       └── amount = pct × purchase | fixed                              │
//! │                    capped by max_discount, then by purchase            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing check wins. `now` is always passed in.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::CoreError;
use crate::money::Money;
use crate::types::{DiscountCode, DiscountScope, DiscountType, DiscountValidation, Percent};

/// Why a code does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountRejection {
    #[error("discount code not found")]
    NotFound,

    #[error("discount code is not active")]
    Inactive,

    #[error("discount code is not valid yet")]
    NotYetValid,

    #[error("discount code has expired")]
    Expired,

    #[error("discount code usage limit reached")]
    UsageLimitReached,

    #[error("minimum purchase of {minimum} not reached")]
    BelowMinimumPurchase { minimum: Money },

    #[error("customer required for this discount code")]
    CustomerRequired,

    #[error("customer not in required category")]
    CustomerNotInCategory,

    #[error("product required for this discount code")]
    ProductRequired,

    #[error("discount code not applicable to this product")]
    NotApplicableToProduct,

    #[error("discount code not applicable to this customer")]
    NotApplicableToCustomer,
}

impl DiscountRejection {
    /// Lifts the rejection into a business error for `code`.
    pub fn into_error(self, code: &str) -> CoreError {
        CoreError::InvalidDiscountCode {
            code: code.to_string(),
            reason: self.to_string(),
        }
    }
}

/// What a code is being evaluated against.
#[derive(Debug, Clone)]
pub struct DiscountContext {
    pub customer_id: Option<String>,
    pub customer_category_id: Option<String>,
    pub product_id: Option<String>,
    /// Pre-discount amount the code applies to.
    pub purchase_amount: Money,
    pub now: DateTime<Utc>,
}

impl DiscountContext {
    pub fn new(purchase_amount: Money, now: DateTime<Utc>) -> Self {
        DiscountContext {
            customer_id: None,
            customer_category_id: None,
            product_id: None,
            purchase_amount,
            now,
        }
    }

    pub fn for_customer(
        mut self,
        customer_id: impl Into<String>,
        category_id: Option<String>,
    ) -> Self {
        self.customer_id = Some(customer_id.into());
        self.customer_category_id = category_id;
        self
    }

    pub fn for_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }
}

/// Evaluates `code` (None when the lookup found nothing) against `ctx`.
///
/// ## Returns
/// The discount amount, never above the purchase amount.
pub fn evaluate(
    code: Option<&DiscountCode>,
    ctx: &DiscountContext,
) -> Result<Money, DiscountRejection> {
    let code = code.ok_or(DiscountRejection::NotFound)?;

    if !code.is_active {
        return Err(DiscountRejection::Inactive);
    }

    if ctx.now < code.valid_from {
        return Err(DiscountRejection::NotYetValid);
    }
    if ctx.now > code.valid_until {
        return Err(DiscountRejection::Expired);
    }

    if code.usage_exhausted() {
        return Err(DiscountRejection::UsageLimitReached);
    }

    if let Some(minimum) = code.min_purchase() {
        if ctx.purchase_amount < minimum {
            return Err(DiscountRejection::BelowMinimumPurchase { minimum });
        }
    }

    check_scope(code, ctx)?;

    Ok(compute_discount_amount(code, ctx.purchase_amount))
}

fn check_scope(code: &DiscountCode, ctx: &DiscountContext) -> Result<(), DiscountRejection> {
    match code.scope {
        DiscountScope::Global => Ok(()),
        DiscountScope::Category => {
            if ctx.customer_id.is_none() {
                return Err(DiscountRejection::CustomerRequired);
            }
            if ctx.customer_category_id.is_none()
                || ctx.customer_category_id != code.customer_category_id
            {
                return Err(DiscountRejection::CustomerNotInCategory);
            }
            Ok(())
        }
        DiscountScope::Product => match &ctx.product_id {
            None => Err(DiscountRejection::ProductRequired),
            Some(product) if Some(product) != code.product_id.as_ref() => {
                Err(DiscountRejection::NotApplicableToProduct)
            }
            Some(_) => Ok(()),
        },
        DiscountScope::Customer => match &ctx.customer_id {
            None => Err(DiscountRejection::CustomerRequired),
            Some(customer) if Some(customer) != code.customer_id.as_ref() => {
                Err(DiscountRejection::NotApplicableToCustomer)
            }
            Some(_) => Ok(()),
        },
    }
}

/// Raw discount of `code` on `purchase_amount`, after both caps.
pub fn compute_discount_amount(code: &DiscountCode, purchase_amount: Money) -> Money {
    let raw = match code.discount_type {
        DiscountType::Percentage => purchase_amount.percent_of(Percent::from_bps(code.value)),
        DiscountType::FixedAmount => Money::from_cents(code.value),
    };

    let capped = match code.max_discount() {
        Some(max) => raw.min(max),
        None => raw,
    };

    capped.min(purchase_amount)
}

impl From<Result<Money, DiscountRejection>> for DiscountValidation {
    fn from(result: Result<Money, DiscountRejection>) -> Self {
        match result {
            Ok(amount) => DiscountValidation {
                is_valid: true,
                discount_amount: amount,
                message: None,
            },
            Err(rejection) => DiscountValidation {
                is_valid: false,
                discount_amount: Money::zero(),
                message: Some(rejection.to_string()),
            },
        }
    }
}
