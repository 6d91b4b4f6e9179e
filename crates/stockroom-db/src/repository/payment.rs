//! # Payment Repository
//!
//! One payment ledger for both order kinds.
//!
//! ## How It Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              PaymentRepository<K: OrderKind> (one transaction)          │
//! │                                                                         │
//! │  apply(payment)                                                        │
//! │       │                                                                 │
//! │       ├── load order (K::ORDERS)        → NotFound                     │
//! │       ├── K::ensure_payable(status)     → OrderLocked / InvalidTransition│
//! │       ├── payment method active?        → BadRequest                   │
//! │       ├── bank account when required?   → BadRequest                   │
//! │       ├── Settlement::apply(amount)     → ExceedsPendingBalance        │
//! │       │                                                                 │
//! │       ├── INSERT payment (K::PAYMENTS)                                 │
//! │       └── UPDATE order paid/pending/status (K::status_after)           │
//! │                                                                         │
//! │  PurchaseKind: status follows the settlement (PENDING → PAID)          │
//! │  SaleKind:     status stays CONFIRMED, payment progress is derived     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payments are never deleted. A wrong payment is cancelled, which gives its
//! amount back to the order's pending balance.
//!
//! `apply_many` runs the same steps for several payments of one order inside
//! a single transaction.

use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::{validate_bank_account, validate_payment_amount};
use stockroom_core::{
    CoreError, DailyPayments, Money, NewPayment, OrderKind, Payment, PaymentMethodTotal, PaymentRevision, PaymentStatus,
    PurchaseKind, SaleKind, Settlement, ValidationError,
};
use tracing::{debug, info};

use super::new_id;
use super::payment_method::usable_payment_method;
use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};

// =============================================================================
// Order Tables
// =============================================================================

/// Where an order kind keeps its rows.
pub trait OrderTables: OrderKind {
    const ORDERS: &'static str;
    const PAYMENTS: &'static str;
}

impl OrderTables for PurchaseKind {
    const ORDERS: &'static str = "purchases";
    const PAYMENTS: &'static str = "purchase_payments";
}

impl OrderTables for SaleKind {
    const ORDERS: &'static str = "sales";
    const PAYMENTS: &'static str = "sale_payments";
}

/// Status and settlement of an active order.
async fn load_order<K: OrderTables>(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<(K::Status, Settlement)> {
    let sql = format!(
        "SELECT status, total_cents, paid_cents FROM {} WHERE id = ? AND deleted_at IS NULL",
        K::ORDERS
    );

    let (status, total, paid): (String, i64, i64) = sqlx::query_as(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(K::ORDER, order_id))?;

    let status = status.parse::<K::Status>()?;
    Ok((status, Settlement::new(Money::from_cents(total), Money::from_cents(paid))))
}

/// Writes paid/pending and the status the kind derives from them.
async fn write_settlement<K: OrderTables>(
    conn: &mut SqliteConnection,
    order_id: &str,
    status: K::Status,
    settlement: &Settlement,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET paid_cents = ?, pending_cents = ?, status = ?, updated_at = ? WHERE id = ?",
        K::ORDERS
    );

    sqlx::query(&sql)
        .bind(settlement.paid().cents())
        .bind(settlement.pending().cents())
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn fetch_payment<K: OrderTables>(conn: &mut SqliteConnection, id: &str) -> DbResult<Payment> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", K::PAYMENTS);

    sqlx::query_as::<_, Payment>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(K::PAYMENT, id).into())
}

/// Payments of one order, oldest first.
pub(crate) async fn fetch_payments(
    conn: &mut SqliteConnection,
    table: &'static str,
    order_id: &str,
) -> DbResult<Vec<Payment>> {
    let sql = format!("SELECT * FROM {table} WHERE order_id = ? ORDER BY paid_at, created_at");

    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(payments)
}

fn check_new_payment(input: &NewPayment) -> DbResult<()> {
    validate_payment_amount(input.amount)?;
    if input.status == PaymentStatus::Cancelled {
        return Err(ValidationError::InvalidFormat {
            field: "status".to_string(),
            reason: "a payment cannot be recorded as cancelled".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Inserts a payment against an order loaded as `status` and `settlement`.
///
/// Returns the payment with the order's status and balance after it.
async fn insert_payment<K: OrderTables>(
    conn: &mut SqliteConnection,
    input: &NewPayment,
    status: K::Status,
    settlement: Settlement,
) -> DbResult<(Payment, K::Status, Settlement)> {
    let method = usable_payment_method(&mut *conn, &input.payment_method_id).await?;
    validate_bank_account(method.requires_bank_account, input.bank_account.as_deref())?;

    // Pending payments are checked against the balance but only
    // completed ones move it.
    let applied = settlement.apply(input.amount)?;

    let id = new_id();
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO {} (
            id, order_id, payment_method_id, amount_cents, paid_at, status,
            reference_number, bank_account, notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        K::PAYMENTS
    );

    sqlx::query(&sql)
        .bind(&id)
        .bind(&input.order_id)
        .bind(&input.payment_method_id)
        .bind(input.amount.cents())
        .bind(input.paid_at.unwrap_or(now))
        .bind(input.status)
        .bind(&input.reference_number)
        .bind(&input.bank_account)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    let (status, settlement) = if input.status.counts_towards_paid() {
        let status = K::status_after(status, &applied);
        write_settlement::<K>(&mut *conn, &input.order_id, status, &applied).await?;
        (status, applied)
    } else {
        (status, settlement)
    };

    let payment = fetch_payment::<K>(&mut *conn, &id).await?;
    Ok((payment, status, settlement))
}

// =============================================================================
// Repository
// =============================================================================

/// Payment ledger for orders of kind `K`.
///
/// ## Usage
/// ```rust,ignore
/// let payment = db.purchase_payments()
///     .apply(NewPayment::new(&purchase.id, &cash.id, Money::from_cents(5000)))
///     .await?;
///
/// db.purchase_payments().cancel(&payment.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PaymentRepository<K> {
    pool: SqlitePool,
    events: EventBus,
    kind: PhantomData<K>,
}

impl<K: OrderTables> PaymentRepository<K> {
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        PaymentRepository {
            pool,
            events,
            kind: PhantomData,
        }
    }

    /// Records a payment against an order and updates its balance.
    ///
    /// ## Returns
    /// * `Err(NotFound)` - Order or payment method missing
    /// * `Err(OrderLocked)` - Order is cancelled
    /// * `Err(ExceedsPendingBalance)` - Amount above what is still owed
    pub async fn apply(&self, input: NewPayment) -> DbResult<Payment> {
        check_new_payment(&input)?;

        let mut tx = self.pool.begin().await?;

        let (status, settlement) = load_order::<K>(&mut tx, &input.order_id).await?;
        K::ensure_payable(&input.order_id, status)?;

        let (payment, _, _) = insert_payment::<K>(&mut tx, &input, status, settlement).await?;
        tx.commit().await?;

        info!(
            order = K::ORDER,
            order_id = %payment.order_id,
            payment_id = %payment.id,
            amount = %payment.amount(),
            "Payment applied"
        );
        self.publish_applied(&payment);

        Ok(payment)
    }

    /// Splits a settlement over several payments of one order, all or none.
    ///
    /// The combined amount is checked against the pending balance before
    /// anything is written.
    pub async fn apply_many(&self, inputs: Vec<NewPayment>) -> DbResult<Vec<Payment>> {
        let Some(first) = inputs.first() else {
            return Err(ValidationError::Required {
                field: "payments".to_string(),
            }
            .into());
        };
        let order_id = first.order_id.clone();

        for input in &inputs {
            check_new_payment(input)?;
            if input.order_id != order_id {
                return Err(ValidationError::Inconsistent {
                    field: "order_id".to_string(),
                    reason: "all payments must belong to the same order".to_string(),
                }
                .into());
            }
        }

        let mut tx = self.pool.begin().await?;

        let (mut status, mut settlement) = load_order::<K>(&mut tx, &order_id).await?;
        K::ensure_payable(&order_id, status)?;
        settlement.apply(inputs.iter().map(|input| input.amount).sum())?;

        let mut payments = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let (payment, after, balance) = insert_payment::<K>(&mut tx, input, status, settlement).await?;
            status = after;
            settlement = balance;
            payments.push(payment);
        }

        tx.commit().await?;

        info!(
            order = K::ORDER,
            order_id = %order_id,
            count = payments.len(),
            pending = %settlement.pending(),
            "Partial payments applied"
        );
        for payment in &payments {
            self.publish_applied(payment);
        }

        Ok(payments)
    }

    fn publish_applied(&self, payment: &Payment) {
        self.events.publish(DomainEvent::PaymentApplied {
            order: K::ORDER.to_string(),
            order_id: payment.order_id.clone(),
            payment_id: payment.id.clone(),
            amount: payment.amount(),
        });
    }

    /// Corrects a payment's amount, reference or notes.
    ///
    /// The old amount is taken back before the new one is validated, so a
    /// payment can be raised up to the order total.
    pub async fn update(&self, id: &str, revision: PaymentRevision) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        if payment.status == PaymentStatus::Cancelled {
            return Err(CoreError::transition(K::PAYMENT, id, payment.status, "update").into());
        }

        let (status, settlement) = load_order::<K>(&mut tx, &payment.order_id).await?;
        K::ensure_payable(&payment.order_id, status)?;

        if payment.status.counts_towards_paid() {
            let revised = settlement.revise(payment.amount(), revision.amount)?;
            write_settlement::<K>(&mut tx, &payment.order_id, K::status_after(status, &revised), &revised)
                .await?;
        } else {
            settlement.apply(revision.amount)?;
        }

        let sql = format!(
            "UPDATE {} SET amount_cents = ?, reference_number = ?, notes = ?, updated_at = ? WHERE id = ?",
            K::PAYMENTS
        );
        sqlx::query(&sql)
            .bind(revision.amount.cents())
            .bind(revision.reference_number.or(payment.reference_number))
            .bind(revision.notes.or(payment.notes))
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        tx.commit().await?;

        debug!(payment_id = %id, amount = %payment.amount(), "Payment updated");
        Ok(payment)
    }

    /// Completes a PENDING payment, moving its amount into the paid balance.
    pub async fn complete(&self, id: &str) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Completed => {
                return Err(CoreError::already(K::PAYMENT, id, payment.status).into())
            }
            PaymentStatus::Cancelled => {
                return Err(CoreError::transition(K::PAYMENT, id, payment.status, "complete").into())
            }
        }

        let (status, settlement) = load_order::<K>(&mut tx, &payment.order_id).await?;
        K::ensure_payable(&payment.order_id, status)?;

        let applied = settlement.apply(payment.amount())?;
        write_settlement::<K>(&mut tx, &payment.order_id, K::status_after(status, &applied), &applied)
            .await?;

        let sql = format!("UPDATE {} SET status = ?, updated_at = ? WHERE id = ?", K::PAYMENTS);
        sqlx::query(&sql)
            .bind(PaymentStatus::Completed)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        tx.commit().await?;

        info!(order = K::ORDER, payment_id = %id, "Payment completed");
        self.publish_applied(&payment);

        Ok(payment)
    }

    /// Cancels a payment. A completed one gives its amount back to pending.
    pub async fn cancel(&self, id: &str) -> DbResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        if payment.status == PaymentStatus::Cancelled {
            return Err(CoreError::already(K::PAYMENT, id, payment.status).into());
        }

        if payment.status.counts_towards_paid() {
            let (status, settlement) = load_order::<K>(&mut tx, &payment.order_id).await?;
            let reversed = settlement.reverse(payment.amount())?;
            write_settlement::<K>(&mut tx, &payment.order_id, K::status_after(status, &reversed), &reversed)
                .await?;
        }

        let sql = format!("UPDATE {} SET status = ?, updated_at = ? WHERE id = ?", K::PAYMENTS);
        sqlx::query(&sql)
            .bind(PaymentStatus::Cancelled)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let payment = fetch_payment::<K>(&mut tx, id).await?;
        tx.commit().await?;

        info!(order = K::ORDER, payment_id = %id, "Payment cancelled");
        self.events.publish(DomainEvent::PaymentCancelled {
            order: K::ORDER.to_string(),
            order_id: payment.order_id.clone(),
            payment_id: payment.id.clone(),
        });

        Ok(payment)
    }

    /// Always fails: payments are cancelled, never deleted.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        Err(CoreError::PaymentDeletionForbidden { id: id.to_string() }.into())
    }

    pub async fn get(&self, id: &str) -> DbResult<Payment> {
        let mut conn = self.pool.acquire().await?;
        fetch_payment::<K>(&mut conn, id).await
    }

    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_payments(&mut conn, K::PAYMENTS, order_id).await
    }

    /// Completed payments grouped by payment method, largest total first.
    pub async fn totals_by_method(&self) -> DbResult<Vec<PaymentMethodTotal>> {
        let sql = format!(
            r#"
            SELECT
                p.payment_method_id,
                m.name AS payment_method_name,
                COUNT(*) AS payment_count,
                COALESCE(SUM(p.amount_cents), 0) AS total_cents
            FROM {} p
            JOIN payment_methods m ON m.id = p.payment_method_id
            WHERE p.status = 'completed'
            GROUP BY p.payment_method_id, m.name
            ORDER BY total_cents DESC
            "#,
            K::PAYMENTS
        );

        let totals = sqlx::query_as::<_, PaymentMethodTotal>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(totals)
    }

    /// Completed payments dated in `[from, until)`, newest first.
    pub async fn list_by_date_range(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<Vec<Payment>> {
        if until < from {
            return Err(ValidationError::Inconsistent {
                field: "until".to_string(),
                reason: "range ends before it starts".to_string(),
            }
            .into());
        }

        let mut conn = self.pool.acquire().await?;
        fetch_completed_between::<K>(&mut conn, from.to_rfc3339(), until.to_rfc3339()).await
    }

    /// Every payment made with one method, newest first.
    pub async fn list_by_method(&self, payment_method_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT * FROM {} WHERE payment_method_id = ? ORDER BY paid_at DESC, created_at DESC",
            K::PAYMENTS
        );

        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_method_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    /// Completed payments dated on `date` and their total.
    pub async fn daily(&self, date: NaiveDate) -> DbResult<DailyPayments> {
        let next = date.succ_opt().ok_or_else(|| ValidationError::InvalidFormat {
            field: "date".to_string(),
            reason: "out of range".to_string(),
        })?;

        let mut conn = self.pool.acquire().await?;
        let payments = fetch_completed_between::<K>(
            &mut conn,
            date.format("%Y-%m-%d").to_string(),
            next.format("%Y-%m-%d").to_string(),
        )
        .await?;

        Ok(DailyPayments {
            date,
            total: payments.iter().map(Payment::amount).sum(),
            payments,
        })
    }
}

/// Completed payments with `from <= paid_at < until`, compared as RFC 3339 text.
async fn fetch_completed_between<K: OrderTables>(
    conn: &mut SqliteConnection,
    from: String,
    until: String,
) -> DbResult<Vec<Payment>> {
    let sql = format!(
        r#"
        SELECT * FROM {}
        WHERE status = 'completed' AND paid_at >= ? AND paid_at < ?
        ORDER BY paid_at DESC, created_at DESC
        "#,
        K::PAYMENTS
    );

    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(from)
        .bind(until)
        .fetch_all(&mut *conn)
        .await?;

    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, cents, setup, units};
    use crate::Database;
    use chrono::TimeZone;
    use stockroom_core::{
        ErrorKind, LineInput, NewPurchase, Percent, Purchase, PurchaseStatus,
    };

    /// 3 × 10.00 at 10% off + 1 × 50.00, both at 12% tax: total 86.24.
    async fn purchase(db: &Database) -> Purchase {
        let supplier = testing::supplier(db, "Acme").await;
        let p1 = testing::product(db, "P-1", 800, 1000).await;
        let p2 = testing::product(db, "P-2", 4000, 5000).await;

        db.purchases()
            .create(NewPurchase {
                invoice_number: None,
                supplier_id: supplier.id,
                date: None,
                due_date: None,
                notes: None,
                lines: vec![
                    LineInput::new(&p1.id, units(3), cents(1000))
                        .with_discount(Percent::from_whole(10))
                        .with_tax(Percent::from_whole(12)),
                    LineInput::new(&p2.id, units(1), cents(5000)).with_tax(Percent::from_whole(12)),
                ],
            })
            .await
            .unwrap()
            .purchase
    }

    /// A small purchase from its own supplier: total 10.00.
    async fn purchase_for(db: &Database) -> Purchase {
        let supplier = testing::supplier(db, "Other").await;
        let product = testing::product(db, "P-9", 500, 1000).await;

        db.purchases()
            .create(NewPurchase {
                invoice_number: None,
                supplier_id: supplier.id,
                date: None,
                due_date: None,
                notes: None,
                lines: vec![LineInput::new(&product.id, units(1), cents(1000))],
            })
            .await
            .unwrap()
            .purchase
    }

    #[tokio::test]
    async fn test_purchase_settles_in_two_payments() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        assert_eq!(purchase.total(), cents(8624));

        db.purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(5000)))
            .await
            .unwrap();
        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::PartiallyPaid);
        assert_eq!(p.paid(), cents(5000));
        assert_eq!(p.pending(), cents(3624));

        let err = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(4000)))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ExceedsPendingBalance { .. })));

        db.purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(3624)))
            .await
            .unwrap();
        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::Paid);
        assert_eq!(p.pending(), cents(0));
    }

    #[tokio::test]
    async fn test_update_reverts_old_amount_first() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;

        let payment = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(8000)))
            .await
            .unwrap();

        // 8624 would fail if 8000 were counted twice
        let revised = db
            .purchase_payments()
            .update(
                &payment.id,
                PaymentRevision {
                    amount: cents(8624),
                    reference_number: Some("TX-1".to_string()),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(revised.amount(), cents(8624));

        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::Paid);

        let err = db
            .purchase_payments()
            .update(
                &payment.id,
                PaymentRevision {
                    amount: cents(9000),
                    reference_number: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_cancel_restores_pending() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;

        let payment = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(8624)))
            .await
            .unwrap();

        let cancelled = db.purchase_payments().cancel(&payment.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::Pending);
        assert_eq!(p.paid(), cents(0));
        assert_eq!(p.pending(), cents(8624));

        let err = db.purchase_payments().cancel(&payment.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db
            .purchase_payments()
            .update(
                &payment.id,
                PaymentRevision {
                    amount: cents(1),
                    reference_number: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_delete_is_forbidden() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        let payment = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(100)))
            .await
            .unwrap();

        let err = db.purchase_payments().delete(&payment.id).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::PaymentDeletionForbidden { .. })));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        db.purchase_payments().get(&payment.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_method_rules() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let bank = testing::payment_method(&db, "BANK", true).await;

        let err = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &bank.id, cents(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        db.purchase_payments()
            .apply(NewPayment::new(&purchase.id, &bank.id, cents(100)).with_bank_account("GT-0001"))
            .await
            .unwrap();

        db.payment_methods().set_active(&bank.id, false).await.unwrap();
        let err = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &bank.id, cents(100)).with_bank_account("GT-0001"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, "missing", cents(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cancelled_purchase_is_locked() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        db.purchases().cancel(&purchase.id).await.unwrap();

        let err = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &cash.id, cents(100)))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::OrderLocked { .. })));
    }

    #[tokio::test]
    async fn test_pending_payment_then_complete() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;

        let mut input = NewPayment::new(&purchase.id, &cash.id, cents(1000));
        input.status = PaymentStatus::Pending;
        let payment = db.purchase_payments().apply(input).await.unwrap();

        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.paid(), cents(0));

        db.purchase_payments().complete(&payment.id).await.unwrap();
        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.paid(), cents(1000));
        assert_eq!(p.status, PurchaseStatus::PartiallyPaid);
    }

    #[tokio::test]
    async fn test_totals_by_method() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        let card = testing::payment_method(&db, "CARD", false).await;

        for (method, amount) in [(&cash, 1000), (&cash, 500), (&card, 3000)] {
            db.purchase_payments()
                .apply(NewPayment::new(&purchase.id, &method.id, cents(amount)))
                .await
                .unwrap();
        }
        let cancelled = db
            .purchase_payments()
            .apply(NewPayment::new(&purchase.id, &card.id, cents(100)))
            .await
            .unwrap();
        db.purchase_payments().cancel(&cancelled.id).await.unwrap();

        let totals = db.purchase_payments().totals_by_method().await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].payment_method_id, card.id);
        assert_eq!(totals[0].total_cents, 3000);
        assert_eq!(totals[1].payment_count, 2);
        assert_eq!(totals[1].total_cents, 1500);

        assert_eq!(db.purchase_payments().list_for_order(&purchase.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_apply_many_is_all_or_nothing() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let other = purchase_for(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        let bank = testing::payment_method(&db, "BANK", true).await;

        let err = db.purchase_payments().apply_many(Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = db
            .purchase_payments()
            .apply_many(vec![
                NewPayment::new(&purchase.id, &cash.id, cents(100)),
                NewPayment::new(&other.id, &cash.id, cents(100)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));

        // Each fits, together they do not
        let err = db
            .purchase_payments()
            .apply_many(vec![
                NewPayment::new(&purchase.id, &cash.id, cents(5000)),
                NewPayment::new(&purchase.id, &cash.id, cents(4000)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ExceedsPendingBalance { .. })));

        // The second payment lacks its bank account, so the first is rolled back
        let err = db
            .purchase_payments()
            .apply_many(vec![
                NewPayment::new(&purchase.id, &cash.id, cents(1000)),
                NewPayment::new(&purchase.id, &bank.id, cents(1000)),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(db.purchase_payments().list_for_order(&purchase.id).await.unwrap().is_empty());

        let payments = db
            .purchase_payments()
            .apply_many(vec![
                NewPayment::new(&purchase.id, &cash.id, cents(3000)),
                NewPayment::new(&purchase.id, &bank.id, cents(2000)).with_bank_account("GT-0001"),
            ])
            .await
            .unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().all(|p| p.status == PaymentStatus::Completed));

        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::PartiallyPaid);
        assert_eq!(p.paid(), cents(5000));
        assert_eq!(p.pending(), cents(3624));

        db.purchase_payments()
            .apply_many(vec![
                NewPayment::new(&purchase.id, &cash.id, cents(3000)),
                NewPayment::new(&purchase.id, &cash.id, cents(624)),
            ])
            .await
            .unwrap();
        let p = db.purchases().get(&purchase.id).await.unwrap().purchase;
        assert_eq!(p.status, PurchaseStatus::Paid);
    }

    #[tokio::test]
    async fn test_payment_queries_by_date_and_method() {
        let db = setup().await;
        let purchase = purchase(&db).await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        let card = testing::payment_method(&db, "CARD", false).await;

        let at = |day: u32, hour: u32| Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap();
        let dated = |method: &str, amount: i64, paid_at| {
            let mut input = NewPayment::new(&purchase.id, method, cents(amount));
            input.paid_at = Some(paid_at);
            input
        };

        db.purchase_payments().apply(dated(cash.id.as_str(), 100, at(1, 9))).await.unwrap();
        db.purchase_payments().apply(dated(card.id.as_str(), 200, at(1, 18))).await.unwrap();
        db.purchase_payments().apply(dated(cash.id.as_str(), 400, at(2, 0))).await.unwrap();
        let cancelled = db.purchase_payments().apply(dated(cash.id.as_str(), 800, at(1, 12))).await.unwrap();
        db.purchase_payments().cancel(&cancelled.id).await.unwrap();

        let day = db
            .purchase_payments()
            .daily(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(day.total, cents(300));
        assert_eq!(day.payments.len(), 2);
        assert_eq!(day.payments[0].amount(), cents(200));

        // The upper bound is exclusive
        let range = db.purchase_payments().list_by_date_range(at(1, 12), at(2, 0)).await.unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].payment_method_id, card.id);

        let range = db.purchase_payments().list_by_date_range(at(1, 0), at(3, 0)).await.unwrap();
        let amounts: Vec<i64> = range.iter().map(|p| p.amount_cents).collect();
        assert_eq!(amounts, vec![400, 200, 100]);

        let err = db
            .purchase_payments()
            .list_by_date_range(at(3, 0), at(1, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // Method history keeps cancelled payments
        let by_cash = db.purchase_payments().list_by_method(&cash.id).await.unwrap();
        let amounts: Vec<i64> = by_cash.iter().map(|p| p.amount_cents).collect();
        assert_eq!(amounts, vec![400, 800, 100]);
        assert!(db.purchase_payments().list_by_method("missing").await.unwrap().is_empty());
    }
}
