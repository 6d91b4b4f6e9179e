//! Product categories and units of measure.

use chrono::Utc;
use sqlx::SqlitePool;
use stockroom_core::validation::validate_name;
use stockroom_core::{Category, CoreError, Unit};
use tracing::debug;

use super::{has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;

// =============================================================================
// Categories
// =============================================================================

/// Repository for product categories.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> DbResult<Category> {
        let name = name.trim();
        validate_name("name", name, 100)?;

        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, name = %name, "Creating category");

        sqlx::query(
            "INSERT INTO categories (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> DbResult<Category> {
        sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Category", id).into())
    }

    pub async fn list_active(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Soft-deletes a category no active product points to.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM products WHERE category_id = ? AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: "Category",
                id: id.to_string(),
                dependents: "products",
            }
            .into());
        }

        soft_delete(&mut tx, "categories", "Category", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "categories", "Category", id).await
    }
}

// =============================================================================
// Units
// =============================================================================

/// Repository for units of measure.
#[derive(Debug, Clone)]
pub struct UnitRepository {
    pool: SqlitePool,
}

impl UnitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UnitRepository { pool }
    }

    pub async fn create(&self, name: &str, abbreviation: &str) -> DbResult<Unit> {
        let name = name.trim();
        validate_name("name", name, 50)?;
        validate_name("abbreviation", abbreviation, 10)?;

        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO units (id, name, abbreviation, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(abbreviation)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> DbResult<Unit> {
        sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("Unit", id).into())
    }

    pub async fn list_active(&self) -> DbResult<Vec<Unit>> {
        let units =
            sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE deleted_at IS NULL ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(units)
    }

    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM products WHERE unit_id = ? AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: "Unit",
                id: id.to_string(),
                dependents: "products",
            }
            .into());
        }

        soft_delete(&mut tx, "units", "Unit", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "units", "Unit", id).await
    }
}
