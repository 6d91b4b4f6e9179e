//! # Stock Repository
//!
//! The stock ledger: append-only movements and the inventory rows they
//! materialize.
//!
//! ## Applying a Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    apply_movement (one transaction)                     │
//! │                                                                         │
//! │  Movement (PENDING, OUT, qty 3)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT inventory (stock 0) ON CONFLICT DO NOTHING    ← lazy create    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE inventories                                                    │
//! │     SET stock = stock - 3, version = version + 1                       │
//! │   WHERE id = ? AND stock >= 3          ← guarded, no read-modify-write │
//! │       │                                                                 │
//! │       ├── 0 rows → InsufficientStock, caller's transaction rolls back  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE movements SET status = completed, inventory_id, completed_at   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Completed movements are never reversed. Undoing one means recording a
//! compensating movement.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use stockroom_core::ledger::{
    apply_effect, ensure_cancellable, ensure_completable, ensure_standalone, stock_delta,
    validate_new_movement, validate_standalone_type,
};
use stockroom_core::validation::{validate_non_negative_money, validate_stock_limits};
use stockroom_core::{
    CoreError, Inventory, InventoryStats, Money, Movement, MovementStats, MovementStatus,
    MovementType, MovementTypeCount, MovementUpdate, NewMovement, Quantity, StockEffect, StockLimits,
    ValidationError,
};
use tracing::{debug, info};

use super::product::fetch_product;
use super::{ensure_exists, new_id, restore, soft_delete};
use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};

const MOVEMENT: &str = "Movement";
const INVENTORY: &str = "Inventory";

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Loads an active movement inside the caller's transaction.
pub(crate) async fn fetch_movement(conn: &mut SqliteConnection, id: &str) -> DbResult<Movement> {
    sqlx::query_as::<_, Movement>("SELECT * FROM movements WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(MOVEMENT, id).into())
}

async fn fetch_inventory_for(
    conn: &mut SqliteConnection,
    product_id: &str,
    branch_id: &str,
) -> DbResult<Option<Inventory>> {
    let inventory = sqlx::query_as::<_, Inventory>(
        "SELECT * FROM inventories WHERE product_id = ? AND branch_id = ?",
    )
    .bind(product_id)
    .bind(branch_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(inventory)
}

/// Inserts a PENDING movement with the given id.
///
/// Validates the input, checks the referenced product and branches, and
/// snapshots the unit cost (the product's cost unless overridden).
pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    id: &str,
    input: &NewMovement,
    now: DateTime<Utc>,
) -> DbResult<Movement> {
    validate_new_movement(input)?;

    if input.status == MovementStatus::Cancelled {
        return Err(ValidationError::InvalidFormat {
            field: "status".to_string(),
            reason: "a movement cannot be recorded as cancelled".to_string(),
        }
        .into());
    }

    let product = fetch_product(conn, &input.product_id).await?;
    ensure_exists(conn, "branches", "Branch", &input.branch_id).await?;
    for branch_id in [&input.source_branch_id, &input.target_branch_id].into_iter().flatten() {
        ensure_exists(conn, "branches", "Branch", branch_id).await?;
    }

    let unit_cost = input.unit_cost.unwrap_or_else(|| product.cost());
    validate_non_negative_money("unit_cost", unit_cost)?;
    let total_cost = unit_cost.times(input.quantity);

    debug!(
        id = %id,
        product_id = %input.product_id,
        branch_id = %input.branch_id,
        movement_type = %input.movement_type,
        quantity = %input.quantity,
        "Inserting movement"
    );

    sqlx::query(
        r#"
        INSERT INTO movements (
            id, product_id, branch_id, quantity_milli, movement_type, status,
            reference_id, source_branch_id, target_branch_id,
            unit_cost_cents, total_cost_cents, movement_date, notes,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&input.product_id)
    .bind(&input.branch_id)
    .bind(input.quantity.milli())
    .bind(input.movement_type)
    .bind(MovementStatus::Pending)
    .bind(&input.reference_id)
    .bind(&input.source_branch_id)
    .bind(&input.target_branch_id)
    .bind(unit_cost.cents())
    .bind(total_cost.cents())
    .bind(input.movement_date.unwrap_or(now))
    .bind(&input.notes)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    fetch_movement(conn, id).await
}

/// Applies a PENDING movement's stock effect and marks it COMPLETED.
///
/// ## Returns
/// The completed movement and the events to publish once the caller commits.
pub(crate) async fn apply_movement(
    conn: &mut SqliteConnection,
    movement: &Movement,
    now: DateTime<Utc>,
) -> DbResult<(Movement, Vec<DomainEvent>)> {
    ensure_completable(movement)?;

    sqlx::query(
        r#"
        INSERT INTO inventories (id, product_id, branch_id, stock_milli, min_stock_milli, version, created_at, updated_at)
        VALUES (?, ?, ?, 0, 0, 0, ?, ?)
        ON CONFLICT (product_id, branch_id) DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(&movement.product_id)
    .bind(&movement.branch_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let inventory = fetch_inventory_for(conn, &movement.product_id, &movement.branch_id)
        .await?
        .ok_or_else(|| CoreError::not_found(INVENTORY, &movement.product_id))?;

    // Fails fast with the stock we just read; the guarded update below
    // catches a concurrent writer that got there first.
    check_stock_after(&inventory, movement)?;

    let delta = stock_delta(movement.movement_type, movement.quantity());
    let result = sqlx::query(
        r#"
        UPDATE inventories SET
            stock_milli = stock_milli + ?1,
            version = version + 1,
            last_movement_at = ?2,
            updated_at = ?2,
            deleted_at = NULL
        WHERE id = ?3
          AND stock_milli + ?1 >= 0
          AND (max_stock_milli IS NULL OR stock_milli + ?1 <= max_stock_milli)
        "#,
    )
    .bind(delta)
    .bind(now)
    .bind(&inventory.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let current = sqlx::query_as::<_, Inventory>("SELECT * FROM inventories WHERE id = ?")
            .bind(&inventory.id)
            .fetch_one(&mut *conn)
            .await?;
        check_stock_after(&current, movement)?;
        return Err(CoreError::transition(
            INVENTORY,
            &current.id,
            "changed concurrently",
            "apply movement",
        )
        .into());
    }

    let result = sqlx::query(
        r#"
        UPDATE movements SET
            status = ?, inventory_id = ?, completed_at = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(MovementStatus::Completed)
    .bind(&inventory.id)
    .bind(now)
    .bind(now)
    .bind(&movement.id)
    .bind(MovementStatus::Pending)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::already(MOVEMENT, &movement.id, MovementStatus::Completed).into());
    }

    let completed = fetch_movement(conn, &movement.id).await?;
    let inventory = fetch_inventory_for(conn, &movement.product_id, &movement.branch_id)
        .await?
        .ok_or_else(|| CoreError::not_found(INVENTORY, &inventory.id))?;

    let mut events = vec![DomainEvent::MovementCompleted {
        movement_id: completed.id.clone(),
        product_id: completed.product_id.clone(),
        branch_id: completed.branch_id.clone(),
        movement_type: completed.movement_type,
        quantity: completed.quantity(),
    }];

    if completed.movement_type.effect() == StockEffect::Decrease
        && inventory.min_stock().is_positive()
        && inventory.stock() <= inventory.min_stock()
    {
        events.push(DomainEvent::LowStock {
            product_id: inventory.product_id.clone(),
            branch_id: inventory.branch_id.clone(),
            stock: inventory.stock(),
            min_stock: inventory.min_stock(),
        });
    }

    Ok((completed, events))
}

/// Checks the stock the movement would leave behind: never negative, and
/// never above `max_stock` for an increase.
fn check_stock_after(inventory: &Inventory, movement: &Movement) -> DbResult<()> {
    let stock = apply_effect(
        &movement.product_id,
        &movement.branch_id,
        inventory.stock(),
        movement.movement_type,
        movement.quantity(),
    )?;

    if movement.movement_type.effect() == StockEffect::Increase {
        validate_stock_limits(stock, &inventory.limits())?;
    }

    Ok(())
}

/// Inserts a movement and, when it was requested COMPLETED, applies it.
pub(crate) async fn record(
    conn: &mut SqliteConnection,
    input: &NewMovement,
    now: DateTime<Utc>,
) -> DbResult<(Movement, Vec<DomainEvent>)> {
    let movement = insert_movement(conn, &new_id(), input, now).await?;

    if input.status == MovementStatus::Completed {
        apply_movement(conn, &movement, now).await
    } else {
        Ok((movement, Vec::new()))
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Criteria for [`StockRepository::list_movements`]. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub branch_id: Option<String>,
    pub movement_type: Option<MovementType>,
    pub status: Option<MovementStatus>,
    /// Inclusive lower bound on `movement_date`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `movement_date`.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the stock ledger.
///
/// ## Usage
/// ```rust,ignore
/// let movement = db.stock()
///     .record_movement(NewMovement::new(&product_id, &branch_id, MovementType::In, qty).completed())
///     .await?;
///
/// let low = db.stock().low_stock(Some(&branch_id)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
    events: EventBus,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        StockRepository { pool, events }
    }

    fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    // -------------------------------------------------------------------------
    // Movements
    // -------------------------------------------------------------------------

    /// Records a movement, applying it right away when its status is COMPLETED.
    ///
    /// Transfer halves are rejected here; [`TransferRepository`] creates both.
    ///
    /// [`TransferRepository`]: super::transfer::TransferRepository
    pub async fn record_movement(&self, input: NewMovement) -> DbResult<Movement> {
        validate_standalone_type(input.movement_type)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let (movement, events) = record(&mut tx, &input, now).await?;

        tx.commit().await?;

        if movement.status == MovementStatus::Completed {
            info!(id = %movement.id, movement_type = %movement.movement_type, "Movement completed");
        }
        self.publish_all(events);

        Ok(movement)
    }

    /// Applies a PENDING movement's stock effect.
    ///
    /// ## Returns
    /// * `Err(AlreadyInState)` - Movement is already completed
    /// * `Err(InvalidTransition)` - Movement was cancelled
    /// * `Err(InvalidTransition)` - Movement is a transfer half
    /// * `Err(InsufficientStock)` - Outbound movement larger than stock
    /// * `Err(Validation)` - Inbound movement would pass `max_stock`
    pub async fn complete_movement(&self, id: &str) -> DbResult<Movement> {
        let mut tx = self.pool.begin().await?;

        let movement = fetch_movement(&mut tx, id).await?;
        ensure_standalone(&movement, "complete outside its transfer")?;
        let (movement, events) = apply_movement(&mut tx, &movement, Utc::now()).await?;

        tx.commit().await?;

        info!(id = %id, movement_type = %movement.movement_type, "Movement completed");
        self.publish_all(events);

        Ok(movement)
    }

    /// Cancels a PENDING movement. Stock is never touched.
    pub async fn cancel_movement(&self, id: &str) -> DbResult<Movement> {
        let mut tx = self.pool.begin().await?;

        let movement = fetch_movement(&mut tx, id).await?;
        ensure_standalone(&movement, "cancel outside its transfer")?;
        ensure_cancellable(&movement)?;

        sqlx::query("UPDATE movements SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(MovementStatus::Cancelled)
            .bind(Utc::now())
            .bind(id)
            .bind(MovementStatus::Pending)
            .execute(&mut *tx)
            .await?;

        let movement = fetch_movement(&mut tx, id).await?;
        tx.commit().await?;

        debug!(id = %id, "Movement cancelled");
        Ok(movement)
    }

    /// Edits notes, date or unit cost of a PENDING movement.
    ///
    /// A new unit cost re-snapshots the total cost for the movement's quantity.
    ///
    /// ## Returns
    /// * `Err(InvalidTransition)` - Movement is not pending, or is a transfer half
    /// * `Err(Validation)` - Negative unit cost
    pub async fn update_movement(&self, id: &str, changes: MovementUpdate) -> DbResult<Movement> {
        if let Some(unit_cost) = changes.unit_cost {
            validate_non_negative_money("unit_cost", unit_cost)?;
        }

        let mut tx = self.pool.begin().await?;

        let movement = fetch_movement(&mut tx, id).await?;
        ensure_standalone(&movement, "update outside its transfer")?;
        if movement.status != MovementStatus::Pending {
            return Err(CoreError::transition(MOVEMENT, id, movement.status, "update").into());
        }

        let unit_cost = changes.unit_cost.unwrap_or_else(|| movement.unit_cost());
        let total_cost = unit_cost.times(movement.quantity());

        let result = sqlx::query(
            r#"
            UPDATE movements SET
                notes = ?, movement_date = ?, unit_cost_cents = ?, total_cost_cents = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(changes.notes.or(movement.notes))
        .bind(changes.movement_date.unwrap_or(movement.movement_date))
        .bind(unit_cost.cents())
        .bind(total_cost.cents())
        .bind(Utc::now())
        .bind(id)
        .bind(MovementStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::transition(MOVEMENT, id, "changed concurrently", "update").into());
        }

        let movement = fetch_movement(&mut tx, id).await?;
        tx.commit().await?;

        debug!(id = %id, total_cost = %movement.total_cost(), "Movement updated");
        Ok(movement)
    }

    pub async fn get_movement(&self, id: &str) -> DbResult<Movement> {
        let mut conn = self.pool.acquire().await?;
        fetch_movement(&mut conn, id).await
    }

    /// Lists movements matching `filter`, newest first.
    pub async fn list_movements(&self, filter: &MovementFilter) -> DbResult<Vec<Movement>> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT * FROM movements WHERE deleted_at IS NULL");

        if let Some(product_id) = &filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(branch_id) = &filter.branch_id {
            query.push(" AND branch_id = ").push_bind(branch_id.clone());
        }
        if let Some(movement_type) = filter.movement_type {
            query.push(" AND movement_type = ").push_bind(movement_type);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(from) = filter.from {
            query.push(" AND movement_date >= ").push_bind(from);
        }
        if let Some(until) = filter.until {
            query.push(" AND movement_date < ").push_bind(until);
        }

        query.push(" ORDER BY movement_date DESC, created_at DESC");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let movements = query.build_query_as::<Movement>().fetch_all(&self.pool).await?;
        Ok(movements)
    }

    pub async fn movements_by_product(&self, product_id: &str) -> DbResult<Vec<Movement>> {
        self.list_movements(&MovementFilter {
            product_id: Some(product_id.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn movements_by_branch(&self, branch_id: &str) -> DbResult<Vec<Movement>> {
        self.list_movements(&MovementFilter {
            branch_id: Some(branch_id.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn movements_by_type(&self, movement_type: MovementType) -> DbResult<Vec<Movement>> {
        self.list_movements(&MovementFilter {
            movement_type: Some(movement_type),
            ..Default::default()
        })
        .await
    }

    /// Movement counters, optionally for one branch.
    pub async fn movement_stats(&self, branch_id: Option<&str>) -> DbResult<MovementStats> {
        let rows = sqlx::query_as::<_, (MovementStatus, MovementType, i64)>(
            r#"
            SELECT status, movement_type, COUNT(*)
            FROM movements
            WHERE deleted_at IS NULL AND (?1 IS NULL OR branch_id = ?1)
            GROUP BY status, movement_type
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = MovementStats::default();
        let mut per_type = [0i64; MovementType::ALL.len()];

        for (status, movement_type, count) in rows {
            stats.total += count;
            match status {
                MovementStatus::Pending => stats.pending += count,
                MovementStatus::Completed => stats.completed += count,
                MovementStatus::Cancelled => stats.cancelled += count,
            }
            if let Some(slot) = MovementType::ALL.iter().position(|t| *t == movement_type) {
                per_type[slot] += count;
            }
        }

        stats.by_type = MovementType::ALL
            .iter()
            .zip(per_type)
            .map(|(movement_type, count)| MovementTypeCount {
                movement_type: *movement_type,
                count,
            })
            .collect();

        Ok(stats)
    }

    /// Soft-deletes a movement that never touched stock.
    pub async fn soft_delete_movement(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let movement = fetch_movement(&mut tx, id).await?;
        ensure_standalone(&movement, "delete outside its transfer")?;
        if movement.status == MovementStatus::Completed {
            return Err(CoreError::transition(MOVEMENT, id, movement.status, "delete").into());
        }

        soft_delete(&mut tx, "movements", MOVEMENT, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore_movement(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "movements", MOVEMENT, id).await
    }

    // -------------------------------------------------------------------------
    // Inventories
    // -------------------------------------------------------------------------

    /// Creates an empty inventory row with reorder limits.
    ///
    /// ## Returns
    /// * `Err(Duplicate)` - The product already has a row at this branch
    pub async fn create_inventory(
        &self,
        product_id: &str,
        branch_id: &str,
        limits: StockLimits,
    ) -> DbResult<Inventory> {
        validate_stock_limits(Quantity::zero(), &limits)?;

        let mut tx = self.pool.begin().await?;

        fetch_product(&mut tx, product_id).await?;
        ensure_exists(&mut tx, "branches", "Branch", branch_id).await?;

        if fetch_inventory_for(&mut tx, product_id, branch_id).await?.is_some() {
            return Err(CoreError::Duplicate {
                field: "inventory",
                value: format!("{product_id}@{branch_id}"),
            }
            .into());
        }

        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO inventories (
                id, product_id, branch_id, stock_milli, min_stock_milli, max_stock_milli,
                version, created_at, updated_at
            ) VALUES (?, ?, ?, 0, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(branch_id)
        .bind(limits.min_stock.milli())
        .bind(limits.max_stock.map(|q| q.milli()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let inventory = fetch_inventory_for(&mut tx, product_id, branch_id)
            .await?
            .ok_or_else(|| CoreError::not_found(INVENTORY, &id))?;
        tx.commit().await?;

        Ok(inventory)
    }

    /// The active inventory row of a product at a branch, if any.
    pub async fn get_inventory(
        &self,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<Inventory>> {
        let mut conn = self.pool.acquire().await?;
        let inventory = fetch_inventory_for(&mut conn, product_id, branch_id).await?;
        Ok(inventory.filter(|inv| inv.deleted_at.is_none()))
    }

    pub async fn inventories_by_branch(&self, branch_id: &str) -> DbResult<Vec<Inventory>> {
        let inventories = sqlx::query_as::<_, Inventory>(
            "SELECT * FROM inventories WHERE branch_id = ? AND deleted_at IS NULL ORDER BY product_id",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(inventories)
    }

    /// Sets reorder limits on an inventory row.
    pub async fn set_limits(&self, inventory_id: &str, limits: StockLimits) -> DbResult<Inventory> {
        let mut tx = self.pool.begin().await?;

        let inventory = sqlx::query_as::<_, Inventory>(
            "SELECT * FROM inventories WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(inventory_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found(INVENTORY, inventory_id))?;

        validate_stock_limits(inventory.stock(), &limits)?;

        sqlx::query(
            "UPDATE inventories SET min_stock_milli = ?, max_stock_milli = ?, updated_at = ? WHERE id = ?",
        )
        .bind(limits.min_stock.milli())
        .bind(limits.max_stock.map(|q| q.milli()))
        .bind(Utc::now())
        .bind(inventory_id)
        .execute(&mut *tx)
        .await?;

        let inventory = sqlx::query_as::<_, Inventory>("SELECT * FROM inventories WHERE id = ?")
            .bind(inventory_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(inventory)
    }

    /// Rows at or below their minimum, lowest stock first.
    pub async fn low_stock(&self, branch_id: Option<&str>) -> DbResult<Vec<Inventory>> {
        let inventories = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT * FROM inventories
            WHERE deleted_at IS NULL
              AND stock_milli <= min_stock_milli
              AND (?1 IS NULL OR branch_id = ?1)
            ORDER BY stock_milli ASC
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(inventories)
    }

    /// Inventory counters and valuation, optionally for one branch.
    pub async fn inventory_stats(&self, branch_id: Option<&str>) -> DbResult<InventoryStats> {
        let rows = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT i.stock_milli, i.min_stock_milli, p.cost_cents
            FROM inventories i
            JOIN products p ON p.id = i.product_id
            WHERE i.deleted_at IS NULL AND (?1 IS NULL OR i.branch_id = ?1)
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = InventoryStats::default();
        for (stock_milli, min_stock_milli, cost_cents) in rows {
            let stock = Quantity::from_milli(stock_milli);

            stats.total_products += 1;
            if stock.is_zero() {
                stats.out_of_stock += 1;
            } else if stock_milli <= min_stock_milli {
                stats.low_stock += 1;
            }
            stats.total_value += Money::from_cents(cost_cents).times(stock);
        }

        Ok(stats)
    }

    /// Soft-deletes an inventory row that no movement has touched.
    pub async fn soft_delete_inventory(&self, inventory_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let pair: Option<(String, String)> = sqlx::query_as(
            "SELECT product_id, branch_id FROM inventories WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(inventory_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (product_id, branch_id) =
            pair.ok_or_else(|| CoreError::not_found(INVENTORY, inventory_id))?;

        let movements: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM movements WHERE inventory_id = ? OR (product_id = ? AND branch_id = ?)",
        )
        .bind(inventory_id)
        .bind(&product_id)
        .bind(&branch_id)
        .fetch_one(&mut *tx)
        .await?;

        if movements > 0 {
            return Err(CoreError::HasDependents {
                entity: INVENTORY,
                id: inventory_id.to_string(),
                dependents: "movements",
            }
            .into());
        }

        soft_delete(&mut tx, "inventories", INVENTORY, inventory_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, setup, stock_of, units};
    use stockroom_core::ErrorKind;

    #[tokio::test]
    async fn test_in_out_adjustment_flow() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 250, 400).await;

        // Scenario: IN 10 (auto-completed), OUT 3, ADJUSTMENT 2
        let inbound = testing::stock_in(&db, &product, &branch, 10).await;
        assert_eq!(inbound.status, MovementStatus::Completed);
        assert_eq!(inbound.unit_cost(), Money::from_cents(250));
        assert_eq!(inbound.total_cost(), Money::from_cents(2500));
        assert!(inbound.inventory_id.is_some());
        assert_eq!(stock_of(&db, &product, &branch).await, units(10));

        let out = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::Out, units(3)))
            .await
            .unwrap();
        assert_eq!(out.status, MovementStatus::Pending);
        assert_eq!(stock_of(&db, &product, &branch).await, units(10));

        db.stock().complete_movement(&out.id).await.unwrap();
        assert_eq!(stock_of(&db, &product, &branch).await, units(7));

        db.stock()
            .record_movement(
                NewMovement::new(&product.id, &branch.id, MovementType::Adjustment, units(2))
                    .completed(),
            )
            .await
            .unwrap();

        let inventory = db.stock().get_inventory(&product.id, &branch.id).await.unwrap().unwrap();
        assert_eq!(inventory.stock(), units(9));
        assert_eq!(inventory.version, 3);
        assert!(inventory.last_movement_at.is_some());
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_everything_untouched() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &branch, 2).await;

        let out = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::Out, units(5)))
            .await
            .unwrap();

        let err = db.stock().complete_movement(&out.id).await.unwrap_err();
        match err.as_core() {
            Some(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(*available, units(2));
                assert_eq!(*requested, units(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        assert_eq!(stock_of(&db, &product, &branch).await, units(2));
        let out = db.stock().get_movement(&out.id).await.unwrap();
        assert_eq!(out.status, MovementStatus::Pending);
    }

    #[tokio::test]
    async fn test_completed_out_on_empty_branch_is_rejected_atomically() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        let err = db
            .stock()
            .record_movement(
                NewMovement::new(&product.id, &branch.id, MovementType::Out, units(1)).completed(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));

        // The insert was rolled back with the failed application
        assert!(db.stock().movements_by_product(&product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_twice_and_cancel_rules() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        let done = testing::stock_in(&db, &product, &branch, 1).await;

        let err = db.stock().complete_movement(&done.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::AlreadyInState { .. })));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db.stock().cancel_movement(&done.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));

        let pending = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::In, units(4)))
            .await
            .unwrap();
        let cancelled = db.stock().cancel_movement(&pending.id).await.unwrap();
        assert_eq!(cancelled.status, MovementStatus::Cancelled);

        let err = db.stock().cancel_movement(&pending.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::AlreadyInState { .. })));

        let err = db.stock().complete_movement(&pending.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(stock_of(&db, &product, &branch).await, units(1));
    }

    #[tokio::test]
    async fn test_record_validates_references() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        let err = db
            .stock()
            .record_movement(NewMovement::new("nope", &branch.id, MovementType::In, units(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::In, Quantity::zero()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // Transfer halves must name both branches
        let err = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::TransferIn, units(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_limits_low_stock_and_stats() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let cola = testing::product(&db, "COLA", 100, 150).await;
        let chips = testing::product(&db, "CHIPS", 200, 300).await;
        let gum = testing::product(&db, "GUM", 10, 20).await;

        testing::stock_in(&db, &cola, &branch, 3).await;
        testing::stock_in(&db, &chips, &branch, 50).await;
        let gum_inv = db
            .stock()
            .create_inventory(&gum.id, &branch.id, StockLimits::default())
            .await
            .unwrap();
        assert_eq!(gum_inv.stock(), Quantity::zero());

        let err = db
            .stock()
            .create_inventory(&gum.id, &branch.id, StockLimits::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let cola_inv = db.stock().get_inventory(&cola.id, &branch.id).await.unwrap().unwrap();
        db.stock()
            .set_limits(
                &cola_inv.id,
                StockLimits {
                    min_stock: units(5),
                    max_stock: Some(units(20)),
                },
            )
            .await
            .unwrap();

        // max below current stock
        let chips_inv = db.stock().get_inventory(&chips.id, &branch.id).await.unwrap().unwrap();
        let err = db
            .stock()
            .set_limits(
                &chips_inv.id,
                StockLimits {
                    min_stock: units(1),
                    max_stock: Some(units(10)),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let low = db.stock().low_stock(Some(&branch.id)).await.unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[0].product_id, gum.id);
        assert_eq!(low[1].product_id, cola.id);

        let stats = db.stock().inventory_stats(None).await.unwrap();
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.low_stock, 1);
        assert_eq!(stats.out_of_stock, 1);
        assert_eq!(stats.total_value, Money::from_cents(3 * 100 + 50 * 200));
    }

    #[tokio::test]
    async fn test_movement_queries_and_stats() {
        let db = setup().await;
        let a = testing::branch(&db, "A").await;
        let b = testing::branch(&db, "B").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        testing::stock_in(&db, &product, &a, 5).await;
        testing::stock_in(&db, &product, &b, 5).await;
        let pending = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &a.id, MovementType::Out, units(1)))
            .await
            .unwrap();
        db.stock().cancel_movement(&pending.id).await.unwrap();

        assert_eq!(db.stock().movements_by_branch(&a.id).await.unwrap().len(), 2);
        assert_eq!(db.stock().movements_by_type(MovementType::In).await.unwrap().len(), 2);

        let completed_at_a = db
            .stock()
            .list_movements(&MovementFilter {
                branch_id: Some(a.id.clone()),
                status: Some(MovementStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed_at_a.len(), 1);

        let stats = db.stock().movement_stats(Some(&a.id)).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        let outs = stats
            .by_type
            .iter()
            .find(|c| c.movement_type == MovementType::Out)
            .unwrap();
        assert_eq!(outs.count, 1);

        assert_eq!(db.stock().movement_stats(None).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_soft_delete_rules() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        let done = testing::stock_in(&db, &product, &branch, 1).await;

        let err = db.stock().soft_delete_movement(&done.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let inventory = db.stock().get_inventory(&product.id, &branch.id).await.unwrap().unwrap();
        let err = db.stock().soft_delete_inventory(&inventory.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let pending = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::In, units(1)))
            .await
            .unwrap();
        db.stock().soft_delete_movement(&pending.id).await.unwrap();
        assert_eq!(db.stock().get_movement(&pending.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        db.stock().restore_movement(&pending.id).await.unwrap();
        db.stock().get_movement(&pending.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_low_stock_event_published() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        testing::stock_in(&db, &product, &branch, 6).await;

        let inventory = db.stock().get_inventory(&product.id, &branch.id).await.unwrap().unwrap();
        db.stock()
            .set_limits(
                &inventory.id,
                StockLimits {
                    min_stock: units(5),
                    max_stock: None,
                },
            )
            .await
            .unwrap();

        let mut rx = db.events().subscribe();
        db.stock()
            .record_movement(
                NewMovement::new(&product.id, &branch.id, MovementType::Out, units(2)).completed(),
            )
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "movement_completed");
        match rx.recv().await.unwrap() {
            DomainEvent::LowStock { stock, .. } => assert_eq!(stock, units(4)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inbound_movements_respect_max_stock() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;
        let inventory = db
            .stock()
            .create_inventory(
                &product.id,
                &branch.id,
                StockLimits {
                    min_stock: units(1),
                    max_stock: Some(units(5)),
                },
            )
            .await
            .unwrap();

        let err = db
            .stock()
            .record_movement(
                NewMovement::new(&product.id, &branch.id, MovementType::In, units(50)).completed(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
        assert_eq!(stock_of(&db, &product, &branch).await, units(0));

        let pending = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::Adjustment, units(6)))
            .await
            .unwrap();
        let err = db.stock().complete_movement(&pending.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(db.stock().get_movement(&pending.id).await.unwrap().status, MovementStatus::Pending);

        // Filling exactly to the maximum is fine, and the limits still hold
        testing::stock_in(&db, &product, &branch, 5).await;
        db.stock().set_limits(&inventory.id, inventory.limits()).await.unwrap();

        // Outbound movements are not capped
        db.stock()
            .record_movement(
                NewMovement::new(&product.id, &branch.id, MovementType::Out, units(2)).completed(),
            )
            .await
            .unwrap();
        assert_eq!(stock_of(&db, &product, &branch).await, units(3));
    }

    #[tokio::test]
    async fn test_update_pending_movement() {
        let db = setup().await;
        let branch = testing::branch(&db, "Main").await;
        let product = testing::product(&db, "P-1", 100, 200).await;

        let pending = db
            .stock()
            .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::In, units(3)))
            .await
            .unwrap();
        assert_eq!(pending.total_cost(), Money::from_cents(300));

        let dated = Utc::now() - chrono::Duration::days(2);
        let updated = db
            .stock()
            .update_movement(
                &pending.id,
                MovementUpdate {
                    notes: Some("Invoice 118".to_string()),
                    movement_date: Some(dated),
                    unit_cost: Some(Money::from_cents(120)),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Invoice 118"));
        assert_eq!(updated.movement_date.timestamp(), dated.timestamp());
        assert_eq!(updated.unit_cost(), Money::from_cents(120));
        assert_eq!(updated.total_cost(), Money::from_cents(360));
        assert_eq!(updated.status, MovementStatus::Pending);

        // Unset fields keep their values
        let updated = db.stock().update_movement(&pending.id, MovementUpdate::default()).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Invoice 118"));
        assert_eq!(updated.total_cost(), Money::from_cents(360));

        let err = db
            .stock()
            .update_movement(
                &pending.id,
                MovementUpdate {
                    unit_cost: Some(Money::from_cents(-1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        db.stock().complete_movement(&pending.id).await.unwrap();
        let err = db
            .stock()
            .update_movement(
                &pending.id,
                MovementUpdate {
                    notes: Some("late".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));

        let err = db.stock().update_movement("missing", MovementUpdate::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
