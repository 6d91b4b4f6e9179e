//! # Party Repositories
//!
//! Suppliers, customers and the loyalty tiers customers climb.
//!
//! ## Customer Tier Re-derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale confirmed (total 120.00)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  customer.total_purchases += 120.00, last_purchase_at = now            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  highest ACTIVE category with min_purchase ≤ total_purchases           │
//! │       │                                                                 │
//! │       ├── found     → customer.category_id = that category             │
//! │       └── not found → category left as it was                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::{validate_name, validate_non_negative_money, validate_percent};
use stockroom_core::{
    CoreError, Customer, CustomerCategory, Money, NewCustomer, NewCustomerCategory, NewSupplier,
    Supplier, ValidationError,
};
use tracing::{debug, info};

use super::{ensure_exists, has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;

async fn ensure_nit_free(
    conn: &mut SqliteConnection,
    table: &'static str,
    nit: &str,
) -> DbResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE nit = ? AND deleted_at IS NULL");
    if has_rows(conn, &sql, nit).await? {
        return Err(CoreError::Duplicate {
            field: "nit",
            value: nit.to_string(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Suppliers
// =============================================================================

/// Repository for suppliers.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn create(&self, input: NewSupplier) -> DbResult<Supplier> {
        validate_name("name", &input.name, 200)?;

        let mut tx = self.pool.begin().await?;

        if let Some(nit) = &input.nit {
            ensure_nit_free(&mut tx, "suppliers", nit).await?;
        }

        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, name = %input.name, "Creating supplier");

        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, nit, email, phone, address, account_number, notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(&input.nit)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.account_number)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> DbResult<Supplier> {
        sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Supplier", id).into())
    }

    pub async fn list_active(&self) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT * FROM suppliers WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(suppliers)
    }

    /// Soft-deletes a supplier without open purchases.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM purchases \
             WHERE supplier_id = ? AND status != 'cancelled' AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: "Supplier",
                id: id.to_string(),
                dependents: "open purchases",
            }
            .into());
        }

        soft_delete(&mut tx, "suppliers", "Supplier", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "suppliers", "Supplier", id).await
    }
}

// =============================================================================
// Customer Categories
// =============================================================================

/// Repository for customer loyalty tiers.
#[derive(Debug, Clone)]
pub struct CustomerCategoryRepository {
    pool: SqlitePool,
}

impl CustomerCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerCategoryRepository { pool }
    }

    pub async fn create(&self, input: NewCustomerCategory) -> DbResult<CustomerCategory> {
        validate_name("name", &input.name, 100)?;
        validate_percent("discount", input.discount)?;
        validate_non_negative_money("min_purchase", input.min_purchase)?;

        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO customer_categories (
                id, name, discount_bps, min_purchase_cents, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.discount.bps())
        .bind(input.min_purchase.cents())
        .bind(input.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> DbResult<CustomerCategory> {
        sqlx::query_as::<_, CustomerCategory>(
            "SELECT * FROM customer_categories WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Customer category", id).into())
    }

    /// Active tiers, lowest threshold first.
    pub async fn list_active(&self) -> DbResult<Vec<CustomerCategory>> {
        let categories = sqlx::query_as::<_, CustomerCategory>(
            r#"
            SELECT * FROM customer_categories
            WHERE is_active = 1 AND deleted_at IS NULL
            ORDER BY min_purchase_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Enables or disables a tier for future re-derivations.
    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<CustomerCategory> {
        let result = sqlx::query(
            "UPDATE customer_categories SET is_active = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Customer category", id).into());
        }
        self.get(id).await
    }

    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM customers WHERE category_id = ? AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: "Customer category",
                id: id.to_string(),
                dependents: "customers",
            }
            .into());
        }

        soft_delete(&mut tx, "customer_categories", "Customer category", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "customer_categories", "Customer category", id).await
    }
}

// =============================================================================
// Customers
// =============================================================================

/// Loads an active customer inside the caller's transaction.
pub(crate) async fn fetch_customer(conn: &mut SqliteConnection, id: &str) -> DbResult<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found("Customer", id).into())
}

/// Adds a confirmed sale to the customer's history and re-derives the tier.
pub(crate) async fn record_purchase(
    conn: &mut SqliteConnection,
    customer_id: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            total_purchases_cents = total_purchases_cents + ?,
            last_purchase_at = ?,
            updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(amount.cents())
    .bind(now)
    .bind(now)
    .bind(customer_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("Customer", customer_id).into());
    }

    let tier: Option<String> = sqlx::query_scalar(
        r#"
        SELECT cc.id FROM customer_categories cc, customers c
        WHERE c.id = ?
          AND cc.is_active = 1 AND cc.deleted_at IS NULL
          AND cc.min_purchase_cents <= c.total_purchases_cents
        ORDER BY cc.min_purchase_cents DESC
        LIMIT 1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(category_id) = tier {
        sqlx::query("UPDATE customers SET category_id = ? WHERE id = ?")
            .bind(&category_id)
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
        debug!(customer_id = %customer_id, category_id = %category_id, "Customer tier derived");
    }

    Ok(())
}

/// Repository for customers.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn create(&self, input: NewCustomer) -> DbResult<Customer> {
        validate_name("name", &input.name, 200)?;

        let mut tx = self.pool.begin().await?;

        if let Some(nit) = &input.nit {
            ensure_nit_free(&mut tx, "customers", nit).await?;
        }
        if let Some(category_id) = &input.category_id {
            ensure_exists(&mut tx, "customer_categories", "Customer category", category_id)
                .await?;
        }

        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, name = %input.name, "Creating customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, nit, email, phone, address, category_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(&input.nit)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.category_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let customer = fetch_customer(&mut tx, &id).await?;
        tx.commit().await?;
        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        fetch_customer(&mut conn, id).await
    }

    pub async fn list_active(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Customers with the highest accumulated purchases.
    pub async fn top_customers(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE deleted_at IS NULL AND total_purchases_cents > 0
            ORDER BY total_purchases_cents DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Credits loyalty points.
    pub async fn add_loyalty_points(&self, id: &str, points: i64) -> DbResult<Customer> {
        if points <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "points".to_string(),
            }
            .into());
        }

        let result = sqlx::query(
            "UPDATE customers SET loyalty_points = loyalty_points + ?, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(points)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Customer", id).into());
        }

        info!(customer_id = %id, points, "Loyalty points added");
        self.get(id).await
    }

    /// Debits loyalty points. The balance never goes below zero.
    pub async fn redeem_loyalty_points(&self, id: &str, points: i64) -> DbResult<Customer> {
        if points <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "points".to_string(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let customer = fetch_customer(&mut tx, id).await?;

        let result = sqlx::query(
            "UPDATE customers SET loyalty_points = loyalty_points - ?, updated_at = ? \
             WHERE id = ? AND loyalty_points >= ?",
        )
        .bind(points)
        .bind(Utc::now())
        .bind(id)
        .bind(points)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ValidationError::OutOfRange {
                field: "points".to_string(),
                min: 1,
                max: customer.loyalty_points,
            }
            .into());
        }

        let customer = fetch_customer(&mut tx, id).await?;
        tx.commit().await?;

        info!(customer_id = %id, points, "Loyalty points redeemed");
        Ok(customer)
    }

    /// Soft-deletes a customer with no sales.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM sales WHERE customer_id = ? AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: "Customer",
                id: id.to_string(),
                dependents: "sales",
            }
            .into());
        }

        soft_delete(&mut tx, "customers", "Customer", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "customers", "Customer", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, cents, setup};
    use stockroom_core::{ErrorKind, Percent};

    fn tier(name: &str, min_cents: i64, is_active: bool) -> NewCustomerCategory {
        NewCustomerCategory {
            name: name.to_string(),
            discount: Percent::from_whole(5),
            min_purchase: cents(min_cents),
            is_active,
        }
    }

    #[tokio::test]
    async fn test_record_purchase_derives_highest_active_tier() {
        let db = setup().await;
        let silver = db.customer_categories().create(tier("Silver", 10_000, true)).await.unwrap();
        let gold = db.customer_categories().create(tier("Gold", 50_000, true)).await.unwrap();
        db.customer_categories().create(tier("Platinum", 60_000, false)).await.unwrap();
        let customer = testing::customer(&db, "Ana").await;

        let mut conn = db.pool().acquire().await.unwrap();
        record_purchase(&mut conn, &customer.id, cents(5_000), Utc::now()).await.unwrap();
        let c = fetch_customer(&mut conn, &customer.id).await.unwrap();
        assert_eq!(c.category_id, None);
        assert_eq!(c.total_purchases(), cents(5_000));
        assert!(c.last_purchase_at.is_some());

        record_purchase(&mut conn, &customer.id, cents(6_000), Utc::now()).await.unwrap();
        let c = fetch_customer(&mut conn, &customer.id).await.unwrap();
        assert_eq!(c.category_id.as_deref(), Some(silver.id.as_str()));

        // Platinum is inactive, Gold is the highest reachable tier
        record_purchase(&mut conn, &customer.id, cents(55_000), Utc::now()).await.unwrap();
        let c = fetch_customer(&mut conn, &customer.id).await.unwrap();
        assert_eq!(c.category_id.as_deref(), Some(gold.id.as_str()));
    }

    #[tokio::test]
    async fn test_loyalty_points() {
        let db = setup().await;
        let customer = testing::customer(&db, "Luis").await;

        let c = db.customers().add_loyalty_points(&customer.id, 120).await.unwrap();
        assert_eq!(c.loyalty_points, 120);

        let c = db.customers().redeem_loyalty_points(&customer.id, 20).await.unwrap();
        assert_eq!(c.loyalty_points, 100);

        let err = db.customers().redeem_loyalty_points(&customer.id, 101).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(db.customers().get(&customer.id).await.unwrap().loyalty_points, 100);
    }

    #[tokio::test]
    async fn test_duplicate_nit() {
        let db = setup().await;
        let input = NewSupplier {
            name: "Acme".to_string(),
            nit: Some("123456-7".to_string()),
            ..Default::default()
        };
        db.suppliers().create(input.clone()).await.unwrap();

        let err = db.suppliers().create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_customer_with_unknown_category() {
        let db = setup().await;
        let err = db
            .customers()
            .create(NewCustomer {
                name: "Eva".to_string(),
                category_id: Some("missing".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_top_customers() {
        let db = setup().await;
        let a = testing::customer(&db, "A").await;
        let b = testing::customer(&db, "B").await;
        testing::customer(&db, "C").await;

        let mut conn = db.pool().acquire().await.unwrap();
        record_purchase(&mut conn, &a.id, cents(100), Utc::now()).await.unwrap();
        record_purchase(&mut conn, &b.id, cents(900), Utc::now()).await.unwrap();
        drop(conn);

        let top = db.customers().top_customers(5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, b.id);
    }
}
