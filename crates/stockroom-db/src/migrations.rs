//! # Database Migrations
//!
//! Embedded SQL migrations for Stockroom.
//!
//! Files live in `migrations/sqlite/` and are embedded at compile time.
//! They run in filename order and are recorded in `_sqlx_migrations`:
//!
//! ```text
//! 001_master_data.sql     branches, catalog, parties, payment methods
//! 002_stock_ledger.sql    inventories + movements
//! 003_discount_codes.sql  codes and their scopes
//! 004_orders.sql          purchases, sales, lines, payments
//! ```
//!
//! Applied files are checksummed; schema changes go into a new numbered file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration. Already-applied files are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(available = MIGRATOR.migrations.len(), "Applying schema migrations");

    MIGRATOR.run(pool).await?;

    info!("Schema up to date");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
