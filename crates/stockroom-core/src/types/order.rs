//! Purchase and sale orders, their lines and their payments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::lines::{LineInput, ManualDiscount, ManualDiscountKind};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::settlement::{Settlement, SettlementStatus};
use crate::types::Percent;

fn unknown_status(value: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "status".to_string(),
        reason: format!("unknown status '{}'", value),
    }
}

// =============================================================================
// Statuses
// =============================================================================

/// Purchase status. Everything but `Cancelled` is derived from payments.
///
/// ```text
/// Pending ──pay──► PartiallyPaid ──pay──► Paid
///    │                  │
///    └──────cancel──────┴──► Cancelled (terminal)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    #[default]
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::PartiallyPaid => "partially_paid",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl From<SettlementStatus> for PurchaseStatus {
    fn from(status: SettlementStatus) -> Self {
        match status {
            SettlementStatus::Pending => PurchaseStatus::Pending,
            SettlementStatus::PartiallyPaid => PurchaseStatus::PartiallyPaid,
            SettlementStatus::Paid => PurchaseStatus::Paid,
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "partially_paid" => Ok(PurchaseStatus::PartiallyPaid),
            "paid" => Ok(PurchaseStatus::Paid),
            "cancelled" => Ok(PurchaseStatus::Cancelled),
            other => Err(unknown_status(other)),
        }
    }
}

/// Sale lifecycle status. Payment progress is tracked separately through
/// [`Sale::settlement_status`].
///
/// ```text
/// Pending ──confirm──► Confirmed
///    │                    │
///    └──────cancel────────┴──► Cancelled (terminal)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Confirmed => "confirmed",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SaleStatus::Pending),
            "confirmed" => Ok(SaleStatus::Confirmed),
            "cancelled" => Ok(SaleStatus::Cancelled),
            other => Err(unknown_status(other)),
        }
    }
}

/// Payment status. Only `Completed` payments count towards the paid amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    #[default]
    Completed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a payment in this status contributes to `paid_cents`.
    pub fn counts_towards_paid(self) -> bool {
        self == PaymentStatus::Completed
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// One product entry on a purchase or a sale.
///
/// `line_total = quantity × unit_price − discount + tax`, each amount
/// rounded to the cent when the line was computed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity_milli: i64,
    pub unit_price_cents: i64,
    pub discount_bps: i64,
    pub discount_cents: i64,
    pub tax_bps: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn discount_rate(&self) -> Percent {
        Percent::from_bps(self.discount_bps)
    }

    #[inline]
    pub fn tax_rate(&self) -> Percent {
        Percent::from_bps(self.tax_bps)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// `quantity × unit_price` before discount and tax.
    pub fn subtotal(&self) -> Money {
        self.unit_price().times(self.quantity())
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment against a purchase or a sale. Never deleted, only cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub payment_method_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
    pub status: PaymentStatus,
    pub reference_number: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for applying a payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub order_id: String,
    pub payment_method_id: String,
    pub amount: Money,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub reference_number: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
}

impl NewPayment {
    /// A completed payment dated now.
    pub fn new(
        order_id: impl Into<String>,
        payment_method_id: impl Into<String>,
        amount: Money,
    ) -> Self {
        NewPayment {
            order_id: order_id.into(),
            payment_method_id: payment_method_id.into(),
            amount,
            paid_at: None,
            status: PaymentStatus::Completed,
            reference_number: None,
            bank_account: None,
            notes: None,
        }
    }

    pub fn with_bank_account(mut self, account: impl Into<String>) -> Self {
        self.bank_account = Some(account.into());
        self
    }
}

/// Correction of an existing payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentRevision {
    pub amount: Money,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

/// Completed payments grouped by method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentMethodTotal {
    pub payment_method_id: String,
    pub payment_method_name: String,
    pub payment_count: i64,
    pub total_cents: i64,
}

/// Completed payments dated on one day, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyPayments {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub total: Money,
    pub payments: Vec<Payment>,
}

// =============================================================================
// Purchase
// =============================================================================

/// A purchase order from a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub invoice_number: String,
    pub supplier_id: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    pub status: PurchaseStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    /// Always `total_cents - paid_cents`.
    pub pending_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Purchase {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    #[inline]
    pub fn pending(&self) -> Money {
        Money::from_cents(self.pending_cents)
    }

    pub fn settlement(&self) -> Settlement {
        Settlement::new(self.total(), self.paid())
    }
}

/// Input for creating a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchase {
    /// Generated as `{PREFIX}-{YYYY}-{NNNN}` when absent.
    pub invoice_number: Option<String>,
    pub supplier_id: String,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
}

/// Header fields that remain editable until the purchase is paid or cancelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseUpdate {
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A purchase with its lines and payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseAggregate {
    pub purchase: Purchase,
    pub details: Vec<OrderLine>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseStats {
    pub total: i64,
    pub pending: i64,
    pub partially_paid: i64,
    pub paid: i64,
    pub cancelled: i64,
    /// Σ totals of non-cancelled purchases.
    pub total_amount: Money,
    /// Σ pending balances of non-cancelled purchases.
    pub pending_amount: Money,
}

// =============================================================================
// Sale
// =============================================================================

/// Who is buying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleCustomer {
    Registered { customer_id: String },
    Guest { name: String, nit: Option<String> },
}

/// A sales order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub invoice_number: String,
    /// Exactly one of `customer_id` and `guest_name` is set.
    pub customer_id: Option<String>,
    pub guest_name: Option<String>,
    pub guest_nit: Option<String>,
    pub branch_id: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    /// Line discounts + manual discounts + discount code.
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub pending_cents: i64,
    pub discount_code_id: Option<String>,
    pub discount_code_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    #[inline]
    pub fn pending(&self) -> Money {
        Money::from_cents(self.pending_cents)
    }

    pub fn settlement(&self) -> Settlement {
        Settlement::new(self.total(), self.paid())
    }

    /// Payment progress, independent of the lifecycle status.
    pub fn settlement_status(&self) -> SettlementStatus {
        self.settlement().status()
    }
}

/// Input for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub invoice_number: Option<String>,
    pub customer: SaleCustomer,
    pub branch_id: String,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    /// Code validated against the pre-discount subtotal.
    pub discount_code: Option<String>,
    pub manual_discounts: Vec<ManualDiscount>,
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
}

/// Order-level discount as stored with the sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleDiscount {
    pub id: String,
    pub sale_id: String,
    pub kind: ManualDiscountKind,
    /// Basis points for `Percent`, cents for `Amount`.
    pub value: i64,
    pub reason: Option<String>,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A sale with its lines, manual discounts and payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleAggregate {
    pub sale: Sale,
    pub details: Vec<OrderLine>,
    pub discounts: Vec<SaleDiscount>,
    pub payments: Vec<Payment>,
}

/// Totals of one day's non-cancelled sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySalesSummary {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub count: i64,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}
