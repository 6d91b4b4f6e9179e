//! # Purchase Repository
//!
//! Purchase orders from suppliers.
//!
//! ## Purchase Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Purchase Lifecycle                                │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── create() → Purchase { status: Pending, pending = total }       │
//! │         (lines computed once, never edited afterwards)                 │
//! │                                                                         │
//! │  2. RECEIVE (independent of payments)                                  │
//! │     └── receive(branch) → one COMPLETED IN movement per line           │
//! │                                                                         │
//! │  3. PAY (PaymentRepository<PurchaseKind>)                              │
//! │     └── Pending → PartiallyPaid → Paid                                 │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                  │
//! │     └── cancel() → Purchase { status: Cancelled }, unless Paid         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::validate_name;
use stockroom_core::{
    CoreError, Money, Movement, MovementStatus, MovementType, NewMovement, NewPurchase, Purchase,
    PurchaseAggregate, PurchaseStats, PurchaseStatus, PurchaseUpdate,
};
use tracing::{debug, info};

use super::details::{fetch_lines, PricedLines};
use super::invoice::{ensure_unique, next_number};
use super::payment::fetch_payments;
use super::product::fetch_product;
use super::stock::record;
use super::{ensure_exists, has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};

const ENTITY: &str = "Purchase";

async fn fetch_purchase(conn: &mut SqliteConnection, id: &str) -> DbResult<Purchase> {
    sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
}

async fn fetch_aggregate(conn: &mut SqliteConnection, id: &str) -> DbResult<PurchaseAggregate> {
    let purchase = fetch_purchase(conn, id).await?;
    let details = fetch_lines(conn, "purchase_details", id).await?;
    let payments = fetch_payments(conn, "purchase_payments", id).await?;

    Ok(PurchaseAggregate {
        purchase,
        details,
        payments,
    })
}

/// Repository for purchase orders.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
    events: EventBus,
    invoice_prefix: String,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool, events: EventBus, invoice_prefix: String) -> Self {
        PurchaseRepository {
            pool,
            events,
            invoice_prefix,
        }
    }

    /// Creates a purchase with its lines.
    ///
    /// ## Returns
    /// * `Err(NotFound)` - Supplier or a product missing
    /// * `Err(Duplicate)` - Invoice number taken
    /// * `Err(Validation)` - No lines, or a line with bad quantity/price/rates
    pub async fn create(&self, input: NewPurchase) -> DbResult<PurchaseAggregate> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ensure_exists(&mut tx, "suppliers", "Supplier", &input.supplier_id).await?;

        let lines = PricedLines::load(&mut tx, &input.lines).await?;
        let totals = lines.totals(Money::zero())?;

        let invoice_number = match input.invoice_number.as_deref().map(str::trim) {
            Some(number) => {
                validate_name("invoice_number", number, 50)?;
                ensure_unique(&mut tx, "purchases", number).await?;
                number.to_string()
            }
            None => next_number(&mut tx, "purchases", &self.invoice_prefix).await?,
        };

        let id = new_id();
        debug!(id = %id, invoice_number = %invoice_number, lines = input.lines.len(), "Creating purchase");

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, invoice_number, supplier_id, date, due_date, status,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                paid_cents, pending_cents, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&invoice_number)
        .bind(&input.supplier_id)
        .bind(input.date.unwrap_or(now))
        .bind(input.due_date)
        .bind(PurchaseStatus::Pending)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.discount.cents())
        .bind(totals.total.cents())
        .bind(totals.total.cents())
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        lines.insert(&mut tx, "purchase_details", &id, now).await?;

        let aggregate = fetch_aggregate(&mut tx, &id).await?;
        tx.commit().await?;

        info!(id = %id, invoice_number = %invoice_number, total = %totals.total, "Purchase created");
        self.events.publish(DomainEvent::PurchaseCreated {
            purchase_id: id,
            invoice_number,
            total: totals.total,
        });

        Ok(aggregate)
    }

    /// Gets a purchase with its lines and payments.
    pub async fn get(&self, id: &str) -> DbResult<PurchaseAggregate> {
        let mut conn = self.pool.acquire().await?;
        fetch_aggregate(&mut conn, id).await
    }

    /// Lists purchases, newest first, optionally by status.
    pub async fn list(&self, status: Option<PurchaseStatus>) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT * FROM purchases
            WHERE deleted_at IS NULL AND (?1 IS NULL OR status = ?1)
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(purchases)
    }

    /// Updates the editable header fields of an open purchase.
    pub async fn update(&self, id: &str, changes: PurchaseUpdate) -> DbResult<Purchase> {
        let mut tx = self.pool.begin().await?;

        let purchase = fetch_purchase(&mut tx, id).await?;
        if matches!(purchase.status, PurchaseStatus::Paid | PurchaseStatus::Cancelled) {
            return Err(CoreError::OrderLocked {
                entity: ENTITY,
                id: id.to_string(),
                status: purchase.status.to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE purchases
            SET due_date = COALESCE(?, due_date), notes = COALESCE(?, notes), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(changes.due_date)
        .bind(changes.notes)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let purchase = fetch_purchase(&mut tx, id).await?;
        tx.commit().await?;

        debug!(id = %id, "Purchase updated");
        Ok(purchase)
    }

    /// Cancels an unpaid or partially paid purchase.
    pub async fn cancel(&self, id: &str) -> DbResult<Purchase> {
        let mut tx = self.pool.begin().await?;

        let purchase = fetch_purchase(&mut tx, id).await?;
        match purchase.status {
            PurchaseStatus::Cancelled => {
                return Err(CoreError::already(ENTITY, id, purchase.status).into())
            }
            PurchaseStatus::Paid => {
                return Err(CoreError::transition(ENTITY, id, purchase.status, "cancel").into())
            }
            PurchaseStatus::Pending | PurchaseStatus::PartiallyPaid => {}
        }

        sqlx::query("UPDATE purchases SET status = ?, updated_at = ? WHERE id = ?")
            .bind(PurchaseStatus::Cancelled)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let purchase = fetch_purchase(&mut tx, id).await?;
        tx.commit().await?;

        info!(id = %id, "Purchase cancelled");
        self.events.publish(DomainEvent::PurchaseCancelled {
            purchase_id: id.to_string(),
        });

        Ok(purchase)
    }

    /// Books the purchased goods into `branch_id`.
    ///
    /// Every stock-managed line becomes a COMPLETED IN movement valued at the
    /// line's unit price and referencing the purchase. A purchase is received
    /// once.
    pub async fn receive(&self, id: &str, branch_id: &str) -> DbResult<Vec<Movement>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let purchase = fetch_purchase(&mut tx, id).await?;
        if purchase.status == PurchaseStatus::Cancelled {
            return Err(CoreError::OrderLocked {
                entity: ENTITY,
                id: id.to_string(),
                status: purchase.status.to_string(),
            }
            .into());
        }
        ensure_exists(&mut tx, "branches", "Branch", branch_id).await?;

        let received: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM movements WHERE reference_id = ? AND movement_type = ? AND status = ?",
        )
        .bind(id)
        .bind(MovementType::In)
        .bind(MovementStatus::Completed)
        .fetch_one(&mut *tx)
        .await?;
        if received > 0 {
            return Err(CoreError::already(ENTITY, id, "received").into());
        }

        let notes = format!("Purchase receipt {}", purchase.invoice_number);
        let mut movements = Vec::new();
        let mut events = Vec::new();

        for line in fetch_lines(&mut tx, "purchase_details", id).await? {
            let product = fetch_product(&mut tx, &line.product_id).await?;
            if !product.manage_stock {
                continue;
            }

            let mut input = NewMovement::new(&line.product_id, branch_id, MovementType::In, line.quantity())
                .completed()
                .with_unit_cost(line.unit_price())
                .with_notes(notes.clone());
            input.reference_id = Some(id.to_string());

            let (movement, movement_events) = record(&mut tx, &input, now).await?;
            movements.push(movement);
            events.extend(movement_events);
        }

        tx.commit().await?;

        info!(
            id = %id,
            branch_id = %branch_id,
            movements = movements.len(),
            "Purchase received"
        );

        events.push(DomainEvent::PurchaseReceived {
            purchase_id: id.to_string(),
            branch_id: branch_id.to_string(),
        });
        for event in events {
            self.events.publish(event);
        }

        Ok(movements)
    }

    /// Soft-deletes a purchase that has no payments.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM purchase_payments WHERE order_id = ?",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: ENTITY,
                id: id.to_string(),
                dependents: "payments",
            }
            .into());
        }

        soft_delete(&mut tx, "purchases", ENTITY, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "purchases", ENTITY, id).await
    }

    /// Counts per status plus open amounts. Cancelled purchases are counted
    /// but left out of the amounts.
    pub async fn stats(&self) -> DbResult<PurchaseStats> {
        let (total, pending, partially_paid, paid, cancelled, total_amount, pending_amount): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'partially_paid'), 0),
                COALESCE(SUM(status = 'paid'), 0),
                COALESCE(SUM(status = 'cancelled'), 0),
                COALESCE(SUM(CASE WHEN status != 'cancelled' THEN total_cents END), 0),
                COALESCE(SUM(CASE WHEN status != 'cancelled' THEN pending_cents END), 0)
            FROM purchases
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PurchaseStats {
            total,
            pending,
            partially_paid,
            paid,
            cancelled,
            total_amount: Money::from_cents(total_amount),
            pending_amount: Money::from_cents(pending_amount),
        })
    }

    /// The number the next purchase without an explicit one will get.
    pub async fn next_invoice_number(&self) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        next_number(&mut conn, "purchases", &self.invoice_prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, cents, setup, stock_of, units};
    use crate::Database;
    use chrono::Datelike;
    use stockroom_core::{ErrorKind, LineInput, NewPayment, Percent, Product, Supplier};

    fn order(supplier: &Supplier, lines: Vec<LineInput>) -> NewPurchase {
        NewPurchase {
            invoice_number: None,
            supplier_id: supplier.id.clone(),
            date: None,
            due_date: None,
            notes: None,
            lines,
        }
    }

    async fn fixture(db: &Database) -> (Supplier, Product, Product) {
        let supplier = testing::supplier(db, "Acme").await;
        let p1 = testing::product(db, "P-1", 800, 1000).await;
        let p2 = testing::product(db, "P-2", 4000, 5000).await;
        (supplier, p1, p2)
    }

    fn scenario_lines(p1: &Product, p2: &Product) -> Vec<LineInput> {
        vec![
            LineInput::new(&p1.id, units(3), cents(1000))
                .with_discount(Percent::from_whole(10))
                .with_tax(Percent::from_whole(12)),
            LineInput::new(&p2.id, units(1), cents(5000)).with_tax(Percent::from_whole(12)),
        ]
    }

    #[tokio::test]
    async fn test_create_computes_totals() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;

        let created = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let purchase = &created.purchase;

        assert_eq!(purchase.subtotal_cents, 8000);
        assert_eq!(purchase.discount_cents, 300);
        assert_eq!(purchase.tax_cents, 924);
        assert_eq!(purchase.total(), cents(8624));
        assert_eq!(purchase.pending(), cents(8624));
        assert_eq!(purchase.status, PurchaseStatus::Pending);

        assert_eq!(created.details.len(), 2);
        assert_eq!(created.details[0].line_total_cents, 3024);
        assert_eq!(created.details[1].line_total_cents, 5600);
        assert!(created.payments.is_empty());

        let year = Utc::now().year();
        assert_eq!(purchase.invoice_number, format!("ORD-{year}-0001"));
        assert_eq!(db.purchases().next_invoice_number().await.unwrap(), format!("ORD-{year}-0002"));
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;

        let err = db.purchases().create(order(&supplier, vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut input = order(&supplier, scenario_lines(&p1, &p2));
        input.supplier_id = "missing".to_string();
        let err = db.purchases().create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .purchases()
            .create(order(&supplier, vec![LineInput::new("missing", units(1), cents(100))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .purchases()
            .create(order(&supplier, vec![LineInput::new(&p1.id, units(0), cents(100))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut input = order(&supplier, scenario_lines(&p1, &p2));
        input.invoice_number = Some("INV-7".to_string());
        db.purchases().create(input.clone()).await.unwrap();
        let err = db.purchases().create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(db.purchases().list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_books_stock() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;
        let branch = testing::branch(&db, "Main").await;

        let created = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let id = &created.purchase.id;

        let movements = db.purchases().receive(id, &branch.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.status == MovementStatus::Completed));
        assert_eq!(movements[0].unit_cost(), cents(1000));
        assert_eq!(movements[0].reference_id.as_deref(), Some(id.as_str()));
        assert_eq!(
            movements[0].notes.as_deref(),
            Some(format!("Purchase receipt {}", created.purchase.invoice_number).as_str())
        );

        assert_eq!(stock_of(&db, &p1, &branch).await, units(3));
        assert_eq!(stock_of(&db, &p2, &branch).await, units(1));

        let err = db.purchases().receive(id, &branch.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(stock_of(&db, &p1, &branch).await, units(3));
    }

    #[tokio::test]
    async fn test_receive_skips_untracked_products() {
        let db = setup().await;
        let (supplier, p1, _) = fixture(&db).await;
        let branch = testing::branch(&db, "Main").await;
        let service = db
            .products()
            .create(stockroom_core::NewProduct {
                manage_stock: false,
                ..stockroom_core::NewProduct::new("Freight", "SVC-1", cents(0), cents(0))
            })
            .await
            .unwrap();

        let created = db
            .purchases()
            .create(order(
                &supplier,
                vec![
                    LineInput::new(&p1.id, units(2), cents(800)),
                    LineInput::new(&service.id, units(1), cents(1500)),
                ],
            ))
            .await
            .unwrap();

        let movements = db.purchases().receive(&created.purchase.id, &branch.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert!(db.stock().get_inventory(&service.id, &branch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_purchase_cannot_be_received() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;
        let branch = testing::branch(&db, "Main").await;

        let created = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let id = &created.purchase.id;

        let cancelled = db.purchases().cancel(id).await.unwrap();
        assert_eq!(cancelled.status, PurchaseStatus::Cancelled);

        let err = db.purchases().cancel(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db.purchases().receive(id, &branch.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderLocked { .. })));
        assert_eq!(stock_of(&db, &p1, &branch).await, units(0));

        let err = db.purchases().update(id, PurchaseUpdate::default()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderLocked { .. })));
    }

    #[tokio::test]
    async fn test_paid_purchase_is_frozen() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;

        let created = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let id = &created.purchase.id;

        let updated = db
            .purchases()
            .update(
                id,
                PurchaseUpdate {
                    notes: Some("deliver on monday".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("deliver on monday"));

        db.purchase_payments()
            .apply(NewPayment::new(id, &cash.id, cents(8624)))
            .await
            .unwrap();

        let err = db.purchases().update(id, PurchaseUpdate::default()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderLocked { .. })));

        let err = db.purchases().cancel(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db.purchases().soft_delete(id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::HasDependents { .. })));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;

        let created = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let id = &created.purchase.id;

        db.purchases().soft_delete(id).await.unwrap();
        assert_eq!(db.purchases().get(id).await.unwrap_err().kind(), ErrorKind::NotFound);

        db.purchases().restore(id).await.unwrap();
        db.purchases().get(id).await.unwrap();
        assert_eq!(db.purchases().restore(id).await.unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_stats() {
        let db = setup().await;
        let (supplier, p1, p2) = fixture(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;

        let a = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let b = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();
        let c = db.purchases().create(order(&supplier, scenario_lines(&p1, &p2))).await.unwrap();

        db.purchase_payments()
            .apply(NewPayment::new(&a.purchase.id, &cash.id, cents(1000)))
            .await
            .unwrap();
        db.purchases().cancel(&c.purchase.id).await.unwrap();

        let stats = db.purchases().stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.partially_paid, 1);
        assert_eq!(stats.paid, 0);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.total_amount, cents(8624 * 2));
        assert_eq!(stats.pending_amount, cents(8624 * 2 - 1000));

        let pending = db.purchases().list(Some(PurchaseStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.purchase.id);
    }
}
