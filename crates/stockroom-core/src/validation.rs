//! # Validation Module
//!
//! Input validation for back-office records.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (shape of a single input)                        │
//! │  ├── Required / length / format                                        │
//! │  └── Ranges: quantity > 0, 0% ≤ rate ≤ 100%, min ≤ max                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Rules modules (ledger, settlement, discount)                 │
//! │  └── State-dependent checks: stock, balances, status transitions       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE constraints (sku, code, invoice number)                    │
//! │  └── Guarded updates (stock_milli >= ?, used_count < usage_limit)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_sku, validate_positive_quantity};
//! use stockroom_core::Quantity;
//!
//! validate_sku("COKE-330").unwrap();
//! validate_positive_quantity(Quantity::from_units(5)).unwrap();
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{DiscountValue, Percent, StockLimits};
use crate::MAX_ORDER_LINES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens, underscores
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_sku;
///
/// assert!(validate_sku("COKE-330").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a required, length-bounded text field (names, codes).
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a discount code string: 3 to 30 characters, letters, digits,
/// hyphens.
pub fn validate_discount_code(code: &str) -> ValidationResult<()> {
    validate_name("code", code, 30)?;

    let code = code.trim();
    if code.chars().count() < 3 {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must be at least 3 characters".to_string(),
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a movement or line quantity.
///
/// ## Rules
/// - Must be positive (> 0); fractional quantities are fine
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  validate_positive_quantity(q)                                          │
/// │       │                                                                 │
/// │       ├── q <= 0?  → Error: "quantity must be positive"                │
/// │       │                                                                 │
/// │       └── OK → movement / order line accepted                          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_positive_quantity(quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a price, cost, or other amount that may be zero.
pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a rate: 0% to 100% inclusive.
pub fn validate_percent(field: &str, rate: Percent) -> ValidationResult<()> {
    if rate.bps() < 0 || rate.bps() > Percent::FULL.bps() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Percent::FULL.bps(),
        });
    }

    Ok(())
}

/// Validates a selling price against the purchase cost.
pub fn validate_price_not_below_cost(price: Money, cost: Money) -> ValidationResult<()> {
    validate_non_negative_money("cost", cost)?;
    validate_non_negative_money("price", price)?;

    if price < cost {
        return Err(ValidationError::PriceBelowCost { price, cost });
    }

    Ok(())
}

/// Validates min/max stock limits against the current stock.
///
/// ## Rules
/// - `min_stock` ≥ 0, `max_stock` ≥ 0 when set
/// - `min_stock` ≤ `max_stock`
/// - current stock ≤ `max_stock`
pub fn validate_stock_limits(stock: Quantity, limits: &StockLimits) -> ValidationResult<()> {
    if limits.min_stock.is_negative() {
        return Err(ValidationError::Negative {
            field: "min_stock".to_string(),
        });
    }

    if let Some(max) = limits.max_stock {
        if max.is_negative() {
            return Err(ValidationError::Negative {
                field: "max_stock".to_string(),
            });
        }
        if limits.min_stock > max {
            return Err(ValidationError::Inconsistent {
                field: "min_stock".to_string(),
                reason: format!("{} is above max_stock {}", limits.min_stock, max),
            });
        }
        if stock > max {
            return Err(ValidationError::Inconsistent {
                field: "max_stock".to_string(),
                reason: format!("{} is below current stock {}", max, stock),
            });
        }
    }

    Ok(())
}

/// Validates a discount code value.
///
/// ## Rules
/// - Percentage: 0% < value ≤ 100%
/// - Fixed amount: > 0
pub fn validate_discount_value(value: &DiscountValue) -> ValidationResult<()> {
    match value {
        DiscountValue::Percentage(rate) => {
            if rate.bps() <= 0 || rate.bps() > Percent::FULL.bps() {
                return Err(ValidationError::OutOfRange {
                    field: "value".to_string(),
                    min: 1,
                    max: Percent::FULL.bps(),
                });
            }
        }
        DiscountValue::FixedAmount(amount) => {
            if !amount.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "value".to_string(),
                });
            }
        }
    }

    Ok(())
}

// =============================================================================
// Relational Validators
// =============================================================================

/// Validates a validity window for a newly created code.
///
/// ## Rules
/// - `from` < `until`
/// - `until` is in the future
pub fn validate_validity_window(
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ValidationResult<()> {
    if from >= until {
        return Err(ValidationError::Inconsistent {
            field: "valid_until".to_string(),
            reason: "must be after valid_from".to_string(),
        });
    }

    if until <= now {
        return Err(ValidationError::Inconsistent {
            field: "valid_until".to_string(),
            reason: "must be in the future".to_string(),
        });
    }

    Ok(())
}

/// Bank account is mandatory for methods flagged `requires_bank_account`.
pub fn validate_bank_account(
    requires_bank_account: bool,
    bank_account: Option<&str>,
) -> ValidationResult<()> {
    let present = bank_account.is_some_and(|account| !account.trim().is_empty());

    if requires_bank_account && !present {
        return Err(ValidationError::Required {
            field: "bank_account".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on an order.
///
/// ## Rules
/// - At least one line
/// - At most [`MAX_ORDER_LINES`]
pub fn validate_order_lines(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if count > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
