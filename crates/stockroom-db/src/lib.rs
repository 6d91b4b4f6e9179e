//! # stockroom-db: Persistence and Workflows for Stockroom
//!
//! This crate owns every read and write against SQLite, and runs the
//! multi-step workflows (receive a purchase, confirm a sale, apply a
//! payment) inside single transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  Caller (API handler, seed binary)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockroom-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ StockRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ PurchaseRepo   │    │ 001_master   │  │   │
//! │  │   │ EventBus      │    │ SaleRepo       │    │ 002_stock    │  │   │
//! │  │   │               │    │ PaymentRepo<K> │    │ ...          │  │   │
//! │  │   └───────────────┘    └───────┬────────┘    └──────────────┘  │   │
//! │  │                                │ rules                          │   │
//! │  │                                ▼                                │   │
//! │  │                      stockroom-core (pure)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository access
//! - [`config`] - Environment configuration
//! - [`migrations`] - Embedded database migrations
//! - [`events`] - Domain events published after commit
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let sale = db.sales().create(new_sale).await?;
//! db.sales().confirm(&sale.id, &branch_id).await?;
//! db.sale_payments().apply(payment).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ConfigError;
pub use error::{DbError, DbResult};
pub use events::{DomainEvent, EventBus};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::branch::BranchRepository;
pub use repository::catalog::{CategoryRepository, UnitRepository};
pub use repository::discount_code::DiscountCodeRepository;
pub use repository::party::{CustomerCategoryRepository, CustomerRepository, SupplierRepository};
pub use repository::payment::PaymentRepository;
pub use repository::payment_method::PaymentMethodRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::StockRepository;
pub use repository::transfer::TransferRepository;
