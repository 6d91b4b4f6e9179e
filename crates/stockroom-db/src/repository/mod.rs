//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Caller                                                                │
//! │       │                                                                 │
//! │       │  db.sales().confirm(&sale_id, &branch_id)                      │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── begin transaction                                                 │
//! │  ├── stock::apply_movement(&mut tx, ..)   ← shared helper             │
//! │  ├── party::record_purchase(&mut tx, ..)  ← shared helper             │
//! │  ├── discount_code::increment_usage(&mut tx, ..)                       │
//! │  ├── commit                                                            │
//! │  └── events.publish(SaleConfirmed)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Helpers that take `&mut SqliteConnection` join whatever transaction  │
//! │  the caller opened, so one workflow is one commit or one rollback.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`branch::BranchRepository`] - Branches
//! - [`catalog::CategoryRepository`], [`catalog::UnitRepository`] - Product classification
//! - [`product::ProductRepository`] - Product CRUD and search
//! - [`party`] - Suppliers, customers and customer categories
//! - [`payment_method::PaymentMethodRepository`] - Payment methods
//! - [`stock::StockRepository`] - Movements and inventories
//! - [`transfer::TransferRepository`] - Two-legged transfers between branches
//! - [`payment::PaymentRepository`] - Payments of purchases and sales
//! - [`purchase::PurchaseRepository`] - Purchase orders
//! - [`sale::SaleRepository`] - Sales orders
//! - [`discount_code::DiscountCodeRepository`] - Discount codes

pub mod branch;
pub mod catalog;
pub(crate) mod details;
pub mod discount_code;
pub(crate) mod invoice;
pub mod party;
pub mod payment;
pub mod payment_method;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod stock;
pub mod transfer;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockroom_core::CoreError;
use uuid::Uuid;

use crate::error::DbResult;

/// Generates a new entity ID.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fails with NotFound unless `id` is an active row of `table`.
pub(crate) async fn ensure_exists(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: &str,
) -> DbResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ? AND deleted_at IS NULL");
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;

    if count == 0 {
        return Err(CoreError::not_found(entity, id).into());
    }
    Ok(())
}

/// Whether `sql` (a `SELECT COUNT(*) ... WHERE x = ?`) counts any rows for `id`.
pub(crate) async fn has_rows(conn: &mut SqliteConnection, sql: &str, id: &str) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Sets `deleted_at` on an active row.
pub(crate) async fn soft_delete(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: &str,
) -> DbResult<()> {
    let now = Utc::now();
    let sql = format!(
        "UPDATE {table} SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL"
    );

    let result = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found(entity, id).into());
    }
    Ok(())
}

/// Clears `deleted_at`. The row must exist and currently be deleted.
pub(crate) async fn restore(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: &str,
) -> DbResult<()> {
    let sql = format!("SELECT deleted_at FROM {table} WHERE id = ?");
    let deleted_at: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match deleted_at {
        None => return Err(CoreError::not_found(entity, id).into()),
        Some(None) => {
            return Err(CoreError::NotDeleted {
                entity,
                id: id.to_string(),
            }
            .into())
        }
        Some(Some(_)) => {}
    }

    let sql = format!("UPDATE {table} SET deleted_at = NULL, updated_at = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
