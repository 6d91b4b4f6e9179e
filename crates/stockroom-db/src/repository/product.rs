//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - CRUD with soft delete
//! - Creation with opening stock per branch
//! - Search across SKU, name and barcode
//! - Price/cost validation shared by create and update
//!
//! ## Price Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create(NewProduct)            update(id, ProductUpdate)               │
//! │       │                              │                                  │
//! │       │                              ▼                                  │
//! │       │                        merge with stored row                   │
//! │       │                              │                                  │
//! │       └──────────────┬───────────────┘                                  │
//! │                      ▼                                                  │
//! │        validate_price_not_below_cost(price, cost)                      │
//! │                      │                                                  │
//! │           price < cost → ValidationError::PriceBelowCost               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::{
    validate_name, validate_non_negative_money, validate_price_not_below_cost, validate_sku,
};
use stockroom_core::{
    CoreError, InitialStock, Money, Movement, MovementType, NewMovement, NewProduct, Product, ProductUpdate,
    ValidationError,
};
use tracing::{debug, info};

use super::{ensure_exists, new_id, restore, soft_delete, stock};
use crate::error::DbResult;
use crate::events::EventBus;

const ENTITY: &str = "Product";

/// Loads an active product inside the caller's transaction.
pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
}

fn validate_pricing(cost: Money, price: Money) -> DbResult<()> {
    validate_non_negative_money("cost", cost)?;
    validate_non_negative_money("price", price)?;
    validate_price_not_below_cost(price, cost)?;
    Ok(())
}

/// Validates and inserts a product inside the caller's transaction.
async fn insert_product(conn: &mut SqliteConnection, input: &NewProduct, now: DateTime<Utc>) -> DbResult<Product> {
    validate_name("name", &input.name, 200)?;
    validate_sku(&input.sku)?;
    validate_pricing(input.cost, input.price)?;

    let sku_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE sku = ?")
        .bind(&input.sku)
        .fetch_one(&mut *conn)
        .await?;
    if sku_taken > 0 {
        return Err(CoreError::Duplicate {
            field: "sku",
            value: input.sku.clone(),
        }
        .into());
    }

    if let Some(barcode) = &input.barcode {
        ensure_barcode_free(conn, barcode, None).await?;
    }
    if let Some(category_id) = &input.category_id {
        ensure_exists(conn, "categories", "Category", category_id).await?;
    }
    if let Some(unit_id) = &input.unit_id {
        ensure_exists(conn, "units", "Unit", unit_id).await?;
    }

    let id = new_id();

    debug!(id = %id, sku = %input.sku, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, description, sku, barcode,
            cost_cents, price_cents, image_url,
            category_id, unit_id, manage_stock,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(&input.sku)
    .bind(&input.barcode)
    .bind(input.cost.cents())
    .bind(input.price.cents())
    .bind(&input.image_url)
    .bind(&input.category_id)
    .bind(&input.unit_id)
    .bind(input.manage_stock)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_product(conn, &id).await
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool, events);
///
/// let results = repo.search("coke", 20).await?;
/// let product = repo.get("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    events: EventBus,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        ProductRepository { pool, events }
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(Duplicate)` - SKU or barcode already exists
    /// * `Err(Validation)` - Bad name/SKU, or price below cost
    pub async fn create(&self, input: NewProduct) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let product = insert_product(&mut tx, &input, Utc::now()).await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Inserts a product with its opening stock at each listed branch.
    ///
    /// Every entry becomes a completed ADJUSTMENT at the product's cost, so
    /// the opening balance is in the ledger like any later movement.
    ///
    /// ## Returns
    /// * `Err(NotFound)` - A branch is missing
    /// * `Err(Validation)` - Stock for a product that does not manage stock,
    ///   a branch listed twice, or a quantity that is not positive
    pub async fn create_with_inventory(
        &self,
        input: NewProduct,
        initial: Vec<InitialStock>,
    ) -> DbResult<(Product, Vec<Movement>)> {
        if !initial.is_empty() && !input.manage_stock {
            return Err(ValidationError::Inconsistent {
                field: "initial_stock".to_string(),
                reason: "product does not manage stock".to_string(),
            }
            .into());
        }

        let mut branches = HashSet::new();
        for entry in &initial {
            if !branches.insert(entry.branch_id.as_str()) {
                return Err(ValidationError::Inconsistent {
                    field: "initial_stock".to_string(),
                    reason: format!("branch {} is listed twice", entry.branch_id),
                }
                .into());
            }
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let product = insert_product(&mut tx, &input, now).await?;

        let mut movements = Vec::with_capacity(initial.len());
        let mut events = Vec::new();
        for entry in &initial {
            let opening = NewMovement::new(&product.id, &entry.branch_id, MovementType::Adjustment, entry.quantity)
                .completed()
                .with_notes("Initial stock");
            let (movement, applied) = stock::record(&mut tx, &opening, now).await?;
            movements.push(movement);
            events.extend(applied);
        }

        tx.commit().await?;

        info!(id = %product.id, sku = %product.sku, branches = movements.len(), "Product created with stock");
        for event in events {
            self.events.publish(event);
        }

        Ok((product, movements))
    }

    /// Gets an active product by ID.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Gets an active product by its SKU.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn find_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE sku = ? AND deleted_at IS NULL",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE deleted_at IS NULL ORDER BY name LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Searches active products by SKU, name or barcode.
    ///
    /// An empty query lists products like [`Self::list_active`].
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();

        debug!(query = %query, limit = %limit, "Searching products");

        if query.is_empty() {
            return self.list_active(limit).await;
        }

        let pattern = format!("%{}%", query);

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL
              AND (sku LIKE ?1 OR name LIKE ?1 OR barcode LIKE ?1)
            ORDER BY name
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Applies a partial update.
    ///
    /// Cost and price are validated on the merged values.
    pub async fn update(&self, id: &str, changes: ProductUpdate) -> DbResult<Product> {
        debug!(id = %id, "Updating product");

        let mut tx = self.pool.begin().await?;
        let current = fetch_product(&mut tx, id).await?;

        let cost = changes.cost.unwrap_or_else(|| current.cost());
        let price = changes.price.unwrap_or_else(|| current.price());
        validate_pricing(cost, price)?;

        let name = changes.name.unwrap_or(current.name);
        validate_name("name", &name, 200)?;

        if let Some(barcode) = &changes.barcode {
            ensure_barcode_free(&mut tx, barcode, Some(id)).await?;
        }
        if let Some(category_id) = &changes.category_id {
            ensure_exists(&mut tx, "categories", "Category", category_id).await?;
        }
        if let Some(unit_id) = &changes.unit_id {
            ensure_exists(&mut tx, "units", "Unit", unit_id).await?;
        }

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?, description = ?, barcode = ?,
                cost_cents = ?, price_cents = ?, image_url = ?,
                category_id = ?, unit_id = ?, manage_stock = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name.trim())
        .bind(changes.description.or(current.description))
        .bind(changes.barcode.or(current.barcode))
        .bind(cost.cents())
        .bind(price.cents())
        .bind(changes.image_url.or(current.image_url))
        .bind(changes.category_id.or(current.category_id))
        .bind(changes.unit_id.or(current.unit_id))
        .bind(changes.manage_stock.unwrap_or(current.manage_stock))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let product = fetch_product(&mut tx, id).await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Soft-deletes a product.
    ///
    /// Historical orders and movements keep pointing at the row.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, "products", ENTITY, id).await
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "products", ENTITY, id).await
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

async fn ensure_barcode_free(
    conn: &mut SqliteConnection,
    barcode: &str,
    except_id: Option<&str>,
) -> DbResult<()> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE barcode = ? AND id != COALESCE(?, '') AND deleted_at IS NULL",
    )
    .bind(barcode)
    .bind(except_id)
    .fetch_one(&mut *conn)
    .await?;

    if taken > 0 {
        return Err(CoreError::Duplicate {
            field: "barcode",
            value: barcode.to_string(),
        }
        .into());
    }
    Ok(())
}
