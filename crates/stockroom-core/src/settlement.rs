//! # Settlement
//!
//! Payment math shared by purchases and sales.
//!
//! ## Balances
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total = 86.24                                                          │
//! │                                                                         │
//! │  apply(50.00)    paid = 50.00   pending = 36.24   PartiallyPaid        │
//! │  apply(36.24)    paid = 86.24   pending =  0.00   Paid                 │
//! │  apply( 0.01)    ✗ exceeds pending balance of 0.00                     │
//! │                                                                         │
//! │  Invariant after every step: pending == total − paid, pending ≥ 0      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Settlement`] is a value: every operation returns the next state and
//! leaves `self` untouched, so a caller persists the result only when the
//! whole operation succeeded.
//!
//! [`OrderKind`] captures what differs between purchases and sales: which
//! order statuses accept payments and how the order status follows the
//! balance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PurchaseStatus, SaleStatus};
use crate::validation::validate_payment_amount;

// =============================================================================
// Settlement Status
// =============================================================================

/// Payment progress derived purely from paid vs total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    PartiallyPaid,
    Paid,
}

/// `paid == 0` → Pending, `0 < paid < total` → PartiallyPaid,
/// `paid ≥ total` → Paid.
pub fn derive_status(total: Money, paid: Money) -> SettlementStatus {
    if paid.is_zero() {
        SettlementStatus::Pending
    } else if paid < total {
        SettlementStatus::PartiallyPaid
    } else {
        SettlementStatus::Paid
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// Total and paid amount of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    total: Money,
    paid: Money,
}

impl Settlement {
    pub fn new(total: Money, paid: Money) -> Self {
        Settlement { total, paid }
    }

    /// A freshly created order: nothing paid yet.
    pub fn unpaid(total: Money) -> Self {
        Settlement::new(total, Money::zero())
    }

    #[inline]
    pub fn total(&self) -> Money {
        self.total
    }

    #[inline]
    pub fn paid(&self) -> Money {
        self.paid
    }

    #[inline]
    pub fn pending(&self) -> Money {
        self.total - self.paid
    }

    pub fn status(&self) -> SettlementStatus {
        derive_status(self.total, self.paid)
    }

    /// Adds a payment. Rejects non-positive amounts and amounts above the
    /// pending balance.
    pub fn apply(&self, amount: Money) -> CoreResult<Settlement> {
        validate_payment_amount(amount)?;
        if amount > self.pending() {
            return Err(CoreError::ExceedsPendingBalance {
                pending: self.pending(),
                requested: amount,
            });
        }
        Ok(Settlement::new(self.total, self.paid + amount))
    }

    /// Replaces a previously applied amount.
    ///
    /// The old amount is taken out first, so the new amount is validated
    /// against the balance as if the old payment had never been made.
    pub fn revise(&self, old_amount: Money, new_amount: Money) -> CoreResult<Settlement> {
        self.reverse(old_amount)?.apply(new_amount)
    }

    /// Takes a previously applied amount back out.
    pub fn reverse(&self, amount: Money) -> CoreResult<Settlement> {
        if amount.is_negative() || amount > self.paid {
            return Err(ValidationError::OutOfRange {
                field: "reversed amount".to_string(),
                min: 0,
                max: self.paid.cents(),
            }
            .into());
        }
        Ok(Settlement::new(self.total, self.paid - amount))
    }
}

// =============================================================================
// Order Kind
// =============================================================================

/// The parts of payment handling that differ between order types.
///
/// Implemented by the zero-sized markers [`PurchaseKind`] and [`SaleKind`];
/// the persistence layer is generic over it so both payment ledgers share
/// one implementation.
pub trait OrderKind: Send + Sync + 'static {
    /// Lifecycle status of the order.
    type Status: Copy + PartialEq + fmt::Display + FromStr<Err = ValidationError> + Send;

    /// Entity name used in errors and logs.
    const ORDER: &'static str;

    /// Entity name of the payments.
    const PAYMENT: &'static str;

    /// Rejects payments on orders that cannot receive them.
    fn ensure_payable(order_id: &str, status: Self::Status) -> CoreResult<()>;

    /// Order status once the balance has moved to `settlement`.
    fn status_after(current: Self::Status, settlement: &Settlement) -> Self::Status;
}

/// Purchases: payable until cancelled, status follows the balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurchaseKind;

impl OrderKind for PurchaseKind {
    type Status = PurchaseStatus;

    const ORDER: &'static str = "Purchase";
    const PAYMENT: &'static str = "Purchase payment";

    fn ensure_payable(order_id: &str, status: PurchaseStatus) -> CoreResult<()> {
        if status == PurchaseStatus::Cancelled {
            return Err(CoreError::OrderLocked {
                entity: Self::ORDER,
                id: order_id.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn status_after(current: PurchaseStatus, settlement: &Settlement) -> PurchaseStatus {
        match current {
            PurchaseStatus::Cancelled => PurchaseStatus::Cancelled,
            _ => settlement.status().into(),
        }
    }
}

/// Sales: payable only once confirmed; the lifecycle status is not driven by
/// payments (see [`crate::types::Sale::settlement_status`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct SaleKind;

impl OrderKind for SaleKind {
    type Status = SaleStatus;

    const ORDER: &'static str = "Sale";
    const PAYMENT: &'static str = "Sale payment";

    fn ensure_payable(order_id: &str, status: SaleStatus) -> CoreResult<()> {
        match status {
            SaleStatus::Confirmed => Ok(()),
            SaleStatus::Cancelled => Err(CoreError::OrderLocked {
                entity: Self::ORDER,
                id: order_id.to_string(),
                status: status.to_string(),
            }),
            SaleStatus::Pending => Err(CoreError::transition(
                Self::ORDER,
                order_id,
                status,
                "accept payments before confirmation",
            )),
        }
    }

    fn status_after(current: SaleStatus, _settlement: &Settlement) -> SaleStatus {
        current
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
