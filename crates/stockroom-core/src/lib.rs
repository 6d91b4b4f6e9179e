//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! This crate holds the back-office rules as pure functions with zero I/O
//! dependencies: stock arithmetic, order line math, payment settlement and
//! discount code evaluation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stockroom Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Callers (API layer, seed binary)                │   │
//! │  │   create_purchase ──► receive ──► create_sale ──► confirm ──►   │   │
//! │  │   apply_payment                                                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            stockroom-db (Repositories + Workflows)              │   │
//! │  │     transactions, guarded updates, events after commit          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │  │  types  │ │  lines  │ │settlement│ │ discount │ │ ledger │  │   │
//! │  │  │ Product │ │ compute │ │  apply   │ │ evaluate │ │ effect │  │   │
//! │  │  │  Sale   │ │aggregate│ │  revise  │ │  caps    │ │ status │  │   │
//! │  │  └─────────┘ └─────────┘ └──────────┘ └──────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Inventory, Movement, Purchase, Sale, ...)
//! - [`money`] / [`quantity`] - Fixed-point amounts (cents, thousandths)
//! - [`lines`] - Order line engine
//! - [`settlement`] - Payment balance math and per-order-kind rules
//! - [`ledger`] - Stock movement effects and status transitions
//! - [`discount`] - Discount code evaluation
//! - [`invoice`] - Invoice numbering
//! - [`validation`] - Field-level rules
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; time is always passed in
//! 2. **No I/O**: database, network and file system access live in stockroom-db
//! 3. **Fixed-Point**: money in cents, quantities in thousandths, rates in basis points
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::{LineInput, Money, Percent, Quantity};
//!
//! let line = LineInput::new("product-1", Quantity::from_units(3), Money::from_cents(1000))
//!     .with_discount(Percent::from_whole(10))
//!     .with_tax(Percent::from_whole(12));
//!
//! let amounts = line.amounts().unwrap();
//! assert_eq!(amounts.total.cents(), 3024);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod lines;
pub mod money;
pub mod quantity;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use stockroom_core::Money` instead of
// `use stockroom_core::money::Money`

pub use discount::{DiscountContext, DiscountRejection};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use lines::{LineAmounts, LineInput, ManualDiscount, ManualDiscountKind, OrderTotals};
pub use money::Money;
pub use quantity::Quantity;
pub use settlement::{derive_status, OrderKind, PurchaseKind, SaleKind, Settlement, SettlementStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single purchase or sale.
///
/// ## Business Reason
/// Keeps a single order transaction bounded.
pub const MAX_ORDER_LINES: usize = 200;

/// Invoice prefix used when none is configured.
pub const DEFAULT_INVOICE_PREFIX: &str = "ORD";
