//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - NotFound / Conflict / BadRequest / Internal    │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  └── DbError          - Database failures + wrapped CoreError          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller (via kind())     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, amounts, states)
//! 3. Every variant maps to exactly one [`ErrorKind`]

use serde::Serialize;
use thiserror::Error;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification surfaced to callers.
///
/// ```text
/// NotFound    entity absent or soft-deleted
/// Conflict    duplicate, already in the target/terminal state, has dependents
/// BadRequest  business rule violation (stock, balance, discount, validation)
/// Internal    storage failure; never caused by caller input
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity cannot be found.
    ///
    /// ## When This Occurs
    /// - ID doesn't exist
    /// - Entity was soft-deleted
    /// - A transfer reference does not resolve to exactly one OUT/IN pair
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Not enough stock for an outbound movement.
    ///
    /// ## When This Occurs
    /// ```text
    /// complete OUT movement (qty: 15)
    ///      │
    ///      ▼
    /// Inventory(product, branch).stock = 10
    ///      │
    ///      ▼
    /// InsufficientStock { available: 10, requested: 15 }
    ///      │
    ///      ▼
    /// Transaction rolled back, stock stays 10
    /// ```
    #[error(
        "Insufficient stock for product {product_id} at branch {branch_id}: \
         available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: String,
        branch_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// The entity is already in the state the operation would move it to.
    ///
    /// ## When This Occurs
    /// - Completing an already completed movement
    /// - Cancelling an already cancelled movement, payment or order
    #[error("{entity} {id} is already {state}")]
    AlreadyInState {
        entity: &'static str,
        id: String,
        state: String,
    },

    /// The requested transition is not allowed from the current state.
    ///
    /// ## When This Occurs
    /// - Confirming a sale that is not pending
    /// - Cancelling a completed movement (needs a compensating movement)
    /// - Completing a cancelled movement
    #[error("{entity} {id} is {current}, cannot {action}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        current: String,
        action: &'static str,
    },

    /// The order is paid or cancelled and its fields are frozen.
    #[error("{entity} {id} is {status} and can no longer be modified")]
    OrderLocked {
        entity: &'static str,
        id: String,
        status: String,
    },

    /// Payment larger than what is still owed.
    #[error("Payment of {requested} exceeds pending balance of {pending}")]
    ExceedsPendingBalance { pending: Money, requested: Money },

    /// Discount code failed evaluation at order creation.
    #[error("Invalid discount code {code}: {reason}")]
    InvalidDiscountCode { code: String, reason: String },

    /// Payments are never removed, only cancelled.
    #[error("Payment {id} cannot be deleted, use cancellation instead")]
    PaymentDeletionForbidden { id: String },

    /// Delete blocked because other records still reference the entity.
    #[error("{entity} {id} cannot be deleted: it has {dependents}")]
    HasDependents {
        entity: &'static str,
        id: String,
        dependents: &'static str,
    },

    /// Unique business key already taken.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: &'static str, value: String },

    /// Restore called on a row that is not deleted.
    #[error("{entity} {id} is not deleted")]
    NotDeleted { entity: &'static str, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an AlreadyInState error.
    pub fn already(entity: &'static str, id: impl Into<String>, state: impl ToString) -> Self {
        CoreError::AlreadyInState {
            entity,
            id: id.into(),
            state: state.to_string(),
        }
    }

    /// Creates an InvalidTransition error.
    pub fn transition(
        entity: &'static str,
        id: impl Into<String>,
        current: impl ToString,
        action: &'static str,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            id: id.into(),
            current: current.to_string(),
            action,
        }
    }

    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::AlreadyInState { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::HasDependents { .. }
            | CoreError::Duplicate { .. }
            | CoreError::NotDeleted { .. } => ErrorKind::Conflict,
            CoreError::InsufficientStock { .. }
            | CoreError::OrderLocked { .. }
            | CoreError::ExceedsPendingBalance { .. }
            | CoreError::InvalidDiscountCode { .. }
            | CoreError::PaymentDeletionForbidden { .. }
            | CoreError::Validation(_) => ErrorKind::BadRequest,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before any row is written.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Selling price lower than the purchase cost.
    #[error("price {price} must not be lower than cost {cost}")]
    PriceBelowCost { price: Money, cost: Money },

    /// Two related fields disagree (min > max, from >= until, ...).
    #[error("{field} is invalid: {reason}")]
    Inconsistent { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            branch_id: "b-1".to_string(),
            available: Quantity::from_units(10),
            requested: Quantity::from_units(15),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1 at branch b-1: available 10, requested 15"
        );

        let err = CoreError::ExceedsPendingBalance {
            pending: Money::zero(),
            requested: Money::from_cents(1),
        };
        assert_eq!(
            err.to_string(),
            "Payment of 0.01 exceeds pending balance of 0.00"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");

        let err = ValidationError::PriceBelowCost {
            price: Money::from_cents(900),
            cost: Money::from_cents(1000),
        };
        assert_eq!(err.to_string(), "price 9.00 must not be lower than cost 10.00");
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(CoreError::not_found("Movement", "m-1").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::already("Movement", "m-1", "completed").kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::Duplicate {
                field: "sku",
                value: "A-1".to_string()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::PaymentDeletionForbidden { id: "x".to_string() }.kind(),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::BadRequest);
    }
}
