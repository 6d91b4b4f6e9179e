//! # Database Pool Management
//!
//! Connection pool creation, configuration and repository access.
//!
//! ```text
//! DbConfig ──► Database::new ──► SqlitePool + EventBus
//!                                   │
//!        db.sales().confirm(..) ────┤ one transaction, events after commit
//!        db.stock().low_stock(..) ──┘ plain reads
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so readers don't block
//! the single writer.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use stockroom_core::{PurchaseKind, SaleKind, DEFAULT_INVOICE_PREFIX};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::events::EventBus;
use crate::migrations;
use crate::repository::branch::BranchRepository;
use crate::repository::catalog::{CategoryRepository, UnitRepository};
use crate::repository::discount_code::DiscountCodeRepository;
use crate::repository::party::{CustomerCategoryRepository, CustomerRepository, SupplierRepository};
use crate::repository::payment::PaymentRepository;
use crate::repository::payment_method::PaymentMethodRepository;
use crate::repository::product::ProductRepository;
use crate::repository::purchase::PurchaseRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::stock::StockRepository;
use crate::repository::transfer::TransferRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/stockroom.db")
///     .max_connections(5)
///     .invoice_prefixes("PUR", "SAL");
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file; created when missing. `:memory:` for tests.
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Apply embedded migrations inside [`Database::new`].
    pub run_migrations: bool,
    /// Prefix for generated purchase invoice numbers (`PREFIX-YYYY-NNNN`).
    pub purchase_prefix: String,
    /// Prefix for generated sale invoice numbers.
    pub sale_prefix: String,
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl DbConfig {
    /// Defaults: 5/1 connections, 30s acquire timeout, "ORD" prefixes.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
            purchase_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            sale_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            event_capacity: 256,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets the purchase and sale invoice prefixes.
    pub fn invoice_prefixes(mut self, purchase: impl Into<String>, sale: impl Into<String>) -> Self {
        self.purchase_prefix = purchase.into();
        self.sale_prefix = sale.into();
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Private in-memory database. One connection, since every connection
    /// to `:memory:` would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            ..DbConfig::new(":memory:")
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: the pool and the event bus are both shared handles.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
/// let purchase = db.purchases().create(input).await?;
/// db.purchases().receive(&purchase.id, &branch.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Domain events, published after commit.
    events: EventBus,

    purchase_prefix: String,
    sale_prefix: String,
}

impl Database {
    /// Opens the pool (WAL, foreign keys on) and applies migrations unless
    /// `config.run_migrations` is off.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening stockroom database");

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            events: EventBus::new(config.event_capacity),
            purchase_prefix: config.purchase_prefix,
            sale_prefix: config.sale_prefix,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Raw pool, for diagnostics.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The bus every repository publishes on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -------------------------------------------------------------------------
    // Master data
    // -------------------------------------------------------------------------

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone(), self.events.clone())
    }

    pub fn branches(&self) -> BranchRepository {
        BranchRepository::new(self.pool.clone())
    }

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }

    pub fn units(&self) -> UnitRepository {
        UnitRepository::new(self.pool.clone())
    }

    pub fn suppliers(&self) -> SupplierRepository {
        SupplierRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn customer_categories(&self) -> CustomerCategoryRepository {
        CustomerCategoryRepository::new(self.pool.clone())
    }

    pub fn payment_methods(&self) -> PaymentMethodRepository {
        PaymentMethodRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Stock
    // -------------------------------------------------------------------------

    /// Returns the stock ledger (movements and inventories).
    pub fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone(), self.events.clone())
    }

    pub fn transfers(&self) -> TransferRepository {
        TransferRepository::new(self.pool.clone(), self.events.clone())
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    pub fn purchases(&self) -> PurchaseRepository {
        PurchaseRepository::new(
            self.pool.clone(),
            self.events.clone(),
            self.purchase_prefix.clone(),
        )
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), self.events.clone(), self.sale_prefix.clone())
    }

    pub fn purchase_payments(&self) -> PaymentRepository<PurchaseKind> {
        PaymentRepository::new(self.pool.clone(), self.events.clone())
    }

    pub fn sale_payments(&self) -> PaymentRepository<SaleKind> {
        PaymentRepository::new(self.pool.clone(), self.events.clone())
    }

    pub fn discount_codes(&self) -> DiscountCodeRepository {
        DiscountCodeRepository::new(self.pool.clone())
    }

    /// Waits for checked-out connections and closes the pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .invoice_prefixes("PUR", "SAL")
            .event_capacity(16);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.purchase_prefix, "PUR");
        assert_eq!(config.sale_prefix, "SAL");
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_default_prefixes() {
        let config = DbConfig::in_memory();
        assert_eq!(config.purchase_prefix, "ORD");
        assert_eq!(config.sale_prefix, "ORD");
        assert_eq!(config.max_connections, 1);
    }
}
