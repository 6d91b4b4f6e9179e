//! # Branch Repository
//!
//! Physical locations that hold stock.
//!
//! A branch referenced by an inventory row or a movement (as its branch or
//! as the source/target of a transfer) cannot be deleted.

use chrono::Utc;
use sqlx::SqlitePool;
use stockroom_core::validation::validate_name;
use stockroom_core::{Branch, CoreError, NewBranch};
use tracing::debug;

use super::{has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;

const ENTITY: &str = "Branch";

/// Repository for branch operations.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    /// Creates a new BranchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    /// Creates a branch.
    ///
    /// ## Returns
    /// * `Err(Duplicate)` - An active branch already has this name
    pub async fn create(&self, input: NewBranch) -> DbResult<Branch> {
        let name = input.name.trim().to_string();
        validate_name("name", &name, 100)?;

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM branches WHERE name = ? AND deleted_at IS NULL",
        )
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;

        if taken > 0 {
            return Err(CoreError::Duplicate {
                field: "branch name",
                value: name,
            }
            .into());
        }

        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, name = %name, "Creating branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, name, address, phone, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id).await
    }

    /// Gets an active branch.
    pub async fn get(&self, id: &str) -> DbResult<Branch> {
        sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
    }

    /// Lists active branches by name.
    pub async fn list_active(&self) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(
            "SELECT * FROM branches WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(branches)
    }

    /// Soft-deletes a branch with no stock history.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting branch");

        let mut tx = self.pool.begin().await?;

        let referenced = has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM inventories WHERE branch_id = ?1",
            id,
        )
        .await?
            || has_rows(
                &mut tx,
                "SELECT COUNT(*) FROM movements \
                 WHERE branch_id = ?1 OR source_branch_id = ?1 OR target_branch_id = ?1",
                id,
            )
            .await?;

        if referenced {
            return Err(CoreError::HasDependents {
                entity: ENTITY,
                id: id.to_string(),
                dependents: "inventory or movements",
            }
            .into());
        }

        soft_delete(&mut tx, "branches", ENTITY, id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Restores a soft-deleted branch.
    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "branches", ENTITY, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, setup};
    use stockroom_core::ErrorKind;

    #[tokio::test]
    async fn test_create_and_get() {
        let db = setup().await;
        let branch = testing::branch(&db, "Downtown").await;

        let fetched = db.branches().get(&branch.id).await.unwrap();
        assert_eq!(fetched.name, "Downtown");
        assert_eq!(db.branches().list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let db = setup().await;
        testing::branch(&db, "Downtown").await;

        let err = db.branches().create(NewBranch::named("Downtown")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_transfer_reference() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let p = testing::product(&db, "SKU-1", 100, 200).await;
        testing::stock_in(&db, &p, &a, 5).await;

        db.transfers()
            .create(stockroom_core::NewTransfer {
                product_id: p.id.clone(),
                from_branch_id: a.id.clone(),
                to_branch_id: b.id.clone(),
                quantity: testing::units(1),
                notes: None,
            })
            .await
            .unwrap();

        // B only appears on the pending TRANSFER_IN and as transfer target
        let err = db.branches().soft_delete(&b.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let db = setup().await;
        let branch = testing::branch(&db, "Empty").await;

        db.branches().soft_delete(&branch.id).await.unwrap();
        let err = db.branches().get(&branch.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        db.branches().restore(&branch.id).await.unwrap();
        db.branches().get(&branch.id).await.unwrap();

        let err = db.branches().restore(&branch.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
