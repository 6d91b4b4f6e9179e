//! # Transfer Repository
//!
//! Moves stock between two branches as a linked pair of movements.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create(product, from: A, to: B, qty 4)                                 │
//! │       │                                                                 │
//! │       ├── TRANSFER_OUT @ A  (PENDING) ─┐                                │
//! │       └── TRANSFER_IN  @ B  (PENDING) ─┴─ reference_id = id of the IN  │
//! │                                                                         │
//! │  complete(reference_id)        one transaction                          │
//! │       ├── apply OUT  (A: stock - 4, may fail InsufficientStock)        │
//! │       └── apply IN   (B: stock + 4)                                    │
//! │                                                                         │
//! │  Any failure rolls back both; the pair stays PENDING.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::ledger::{ensure_cancellable, pair_transfer, validate_transfer};
use stockroom_core::{
    Movement, MovementStatus, MovementType, NewMovement, NewTransfer, Transfer,
};
use tracing::info;

use super::new_id;
use super::stock::{apply_movement, fetch_movement, insert_movement};
use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};

async fn fetch_transfer(conn: &mut SqliteConnection, reference_id: &str) -> DbResult<Transfer> {
    let movements = sqlx::query_as::<_, Movement>(
        "SELECT * FROM movements WHERE reference_id = ? AND deleted_at IS NULL",
    )
    .bind(reference_id)
    .fetch_all(&mut *conn)
    .await?;

    let (outbound, inbound) = pair_transfer(reference_id, movements)?;

    Ok(Transfer {
        reference_id: reference_id.to_string(),
        outbound,
        inbound,
    })
}

/// Repository for branch-to-branch transfers.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
    events: EventBus,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        TransferRepository { pool, events }
    }

    /// Creates the two PENDING halves of a transfer.
    ///
    /// ## Returns
    /// * `Err(Validation)` - Same source and target, or quantity ≤ 0
    /// * `Err(NotFound)` - Product or either branch missing
    pub async fn create(&self, input: NewTransfer) -> DbResult<Transfer> {
        validate_transfer(&input)?;

        let now = Utc::now();
        let inbound_id = new_id();

        let half = |branch_id: &str, movement_type: MovementType| NewMovement {
            product_id: input.product_id.clone(),
            branch_id: branch_id.to_string(),
            movement_type,
            quantity: input.quantity,
            status: MovementStatus::Pending,
            unit_cost: None,
            reference_id: Some(inbound_id.clone()),
            source_branch_id: Some(input.from_branch_id.clone()),
            target_branch_id: Some(input.to_branch_id.clone()),
            movement_date: Some(now),
            notes: input.notes.clone(),
        };

        let mut tx = self.pool.begin().await?;

        let outbound = insert_movement(
            &mut tx,
            &new_id(),
            &half(&input.from_branch_id, MovementType::TransferOut),
            now,
        )
        .await?;
        let inbound = insert_movement(
            &mut tx,
            &inbound_id,
            &half(&input.to_branch_id, MovementType::TransferIn),
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            reference_id = %inbound_id,
            product_id = %input.product_id,
            from = %input.from_branch_id,
            to = %input.to_branch_id,
            quantity = %input.quantity,
            "Transfer created"
        );

        Ok(Transfer {
            reference_id: inbound_id,
            outbound,
            inbound,
        })
    }

    /// Applies both halves atomically, OUT first.
    pub async fn complete(&self, reference_id: &str) -> DbResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let transfer = fetch_transfer(&mut tx, reference_id).await?;
        let (outbound, mut events) = apply_movement(&mut tx, &transfer.outbound, now).await?;
        let (inbound, inbound_events) = apply_movement(&mut tx, &transfer.inbound, now).await?;
        events.extend(inbound_events);

        tx.commit().await?;

        info!(reference_id = %reference_id, quantity = %outbound.quantity(), "Transfer completed");

        events.push(DomainEvent::TransferCompleted {
            reference_id: reference_id.to_string(),
            product_id: outbound.product_id.clone(),
            from_branch_id: outbound.branch_id.clone(),
            to_branch_id: inbound.branch_id.clone(),
            quantity: outbound.quantity(),
        });
        for event in events {
            self.events.publish(event);
        }

        Ok(Transfer {
            reference_id: reference_id.to_string(),
            outbound,
            inbound,
        })
    }

    /// Cancels both PENDING halves.
    pub async fn cancel(&self, reference_id: &str) -> DbResult<Transfer> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let transfer = fetch_transfer(&mut tx, reference_id).await?;
        ensure_cancellable(&transfer.outbound)?;
        ensure_cancellable(&transfer.inbound)?;

        sqlx::query("UPDATE movements SET status = ?, updated_at = ? WHERE reference_id = ?")
            .bind(MovementStatus::Cancelled)
            .bind(now)
            .bind(reference_id)
            .execute(&mut *tx)
            .await?;

        let outbound = fetch_movement(&mut tx, &transfer.outbound.id).await?;
        let inbound = fetch_movement(&mut tx, &transfer.inbound.id).await?;
        tx.commit().await?;

        info!(reference_id = %reference_id, "Transfer cancelled");

        Ok(Transfer {
            reference_id: reference_id.to_string(),
            outbound,
            inbound,
        })
    }

    pub async fn get(&self, reference_id: &str) -> DbResult<Transfer> {
        let mut conn = self.pool.acquire().await?;
        fetch_transfer(&mut conn, reference_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, setup, stock_of, units};
    use stockroom_core::{CoreError, ErrorKind, MovementUpdate, StockLimits};

    fn transfer(product: &str, from: &str, to: &str, n: i64) -> NewTransfer {
        NewTransfer {
            product_id: product.to_string(),
            from_branch_id: from.to_string(),
            to_branch_id: to.to_string(),
            quantity: units(n),
            notes: Some("restock".to_string()),
        }
    }

    #[tokio::test]
    async fn test_transfer_moves_stock() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &a, 10).await;

        let created = db.transfers().create(transfer(&product.id, &a.id, &b.id, 4)).await.unwrap();
        assert_eq!(created.reference_id, created.inbound.id);
        assert_eq!(created.outbound.reference_id.as_deref(), Some(created.inbound.id.as_str()));
        assert_eq!(created.outbound.source_branch_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(created.inbound.target_branch_id.as_deref(), Some(b.id.as_str()));
        assert!(!created.is_completed());
        assert_eq!(stock_of(&db, &product, &a).await, units(10));

        let done = db.transfers().complete(&created.reference_id).await.unwrap();
        assert!(done.is_completed());
        assert_eq!(stock_of(&db, &product, &a).await, units(6));
        assert_eq!(stock_of(&db, &product, &b).await, units(4));

        let err = db.transfers().complete(&created.reference_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_failed_transfer_rolls_back_both_halves() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &a, 5).await;

        let created = db.transfers().create(transfer(&product.id, &a.id, &b.id, 8)).await.unwrap();

        let err = db.transfers().complete(&created.reference_id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));

        let after = db.transfers().get(&created.reference_id).await.unwrap();
        assert_eq!(after.outbound.status, MovementStatus::Pending);
        assert_eq!(after.inbound.status, MovementStatus::Pending);
        assert_eq!(stock_of(&db, &product, &a).await, units(5));
        assert_eq!(stock_of(&db, &product, &b).await, units(0));
    }

    #[tokio::test]
    async fn test_invalid_transfers() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        let err = db.transfers().create(transfer(&product.id, &a.id, &a.id, 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = db.transfers().create(transfer(&product.id, &a.id, "nowhere", 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db.transfers().complete("no-such-reference").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_transfer() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        let created = db.transfers().create(transfer(&product.id, &a.id, &b.id, 1)).await.unwrap();
        let cancelled = db.transfers().cancel(&created.reference_id).await.unwrap();
        assert_eq!(cancelled.outbound.status, MovementStatus::Cancelled);
        assert_eq!(cancelled.inbound.status, MovementStatus::Cancelled);

        let err = db.transfers().complete(&created.reference_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_halves_only_move_through_the_transfer() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &a, 10).await;

        let created = db.transfers().create(transfer(&product.id, &a.id, &b.id, 4)).await.unwrap();

        let err = db.stock().complete_movement(&created.inbound.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));
        let err = db.stock().complete_movement(&created.outbound.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db.stock().cancel_movement(&created.outbound.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));

        let err = db.stock().soft_delete_movement(&created.inbound.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db
            .stock()
            .update_movement(&created.inbound.id, MovementUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let untouched = db.transfers().get(&created.reference_id).await.unwrap();
        assert_eq!(untouched.outbound.status, MovementStatus::Pending);
        assert_eq!(untouched.inbound.status, MovementStatus::Pending);
        assert_eq!(stock_of(&db, &product, &a).await, units(10));
        assert_eq!(stock_of(&db, &product, &b).await, units(0));

        // A lone half cannot be recorded either
        let mut half = NewMovement::new(&product.id, &b.id, MovementType::TransferIn, units(3));
        half.source_branch_id = Some(a.id.clone());
        half.target_branch_id = Some(b.id.clone());
        let err = db.stock().record_movement(half.completed()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(stock_of(&db, &product, &b).await, units(0));

        let done = db.transfers().complete(&created.reference_id).await.unwrap();
        assert!(done.is_completed());
        assert_eq!(stock_of(&db, &product, &b).await, units(4));
    }

    #[tokio::test]
    async fn test_target_max_stock_rolls_back_transfer() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &a, 10).await;
        db.stock()
            .create_inventory(
                &product.id,
                &b.id,
                StockLimits {
                    min_stock: units(0),
                    max_stock: Some(units(3)),
                },
            )
            .await
            .unwrap();

        let created = db.transfers().create(transfer(&product.id, &a.id, &b.id, 4)).await.unwrap();
        let err = db.transfers().complete(&created.reference_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let after = db.transfers().get(&created.reference_id).await.unwrap();
        assert_eq!(after.outbound.status, MovementStatus::Pending);
        assert_eq!(stock_of(&db, &product, &a).await, units(10));
        assert_eq!(stock_of(&db, &product, &b).await, units(0));
    }
}
