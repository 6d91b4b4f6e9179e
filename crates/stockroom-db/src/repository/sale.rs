//! # Sale Repository
//!
//! Database operations for sales, their lines and order-level discounts.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                           │
//! │     └── create() → Sale { status: Pending }                            │
//! │         ├── discount code evaluated on Σ qty × price                  │
//! │         └── manual discounts taken off the subtotal                    │
//! │                                                                         │
//! │  2. CONFIRM (one transaction, all or nothing)                          │
//! │     └── confirm(branch) → Sale { status: Confirmed }                   │
//! │         ├── one COMPLETED OUT movement per line  → InsufficientStock  │
//! │         ├── customer total_purchases + tier                           │
//! │         └── discount code used_count + 1         → usage limit        │
//! │                                                                         │
//! │  3. PAY (PaymentRepository<SaleKind>, confirmed sales only)            │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                  │
//! │     └── cancel() → Sale { status: Cancelled }                          │
//! │         (stock and customer history are left as they are)              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::discount::evaluate;
use stockroom_core::validation::validate_name;
use stockroom_core::{
    CoreError, DailySalesSummary, DiscountContext, Money, MovementType, NewMovement, NewSale, Sale,
    SaleAggregate, SaleCustomer, SaleDiscount, SaleStatus, ValidationError,
};
use tracing::{debug, info};

use super::details::{fetch_lines, PricedLines};
use super::discount_code::{find_by_code, increment_usage};
use super::invoice::{ensure_unique, next_number};
use super::party::{fetch_customer, record_purchase};
use super::payment::fetch_payments;
use super::product::fetch_product;
use super::stock::record;
use super::{ensure_exists, has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};

const ENTITY: &str = "Sale";

async fn fetch_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Sale> {
    sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
}

async fn fetch_aggregate(conn: &mut SqliteConnection, id: &str) -> DbResult<SaleAggregate> {
    let sale = fetch_sale(conn, id).await?;
    let details = fetch_lines(conn, "sale_details", id).await?;
    let discounts = sqlx::query_as::<_, SaleDiscount>(
        "SELECT * FROM sale_discounts WHERE sale_id = ? ORDER BY created_at, rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let payments = fetch_payments(conn, "sale_payments", id).await?;

    Ok(SaleAggregate {
        sale,
        details,
        discounts,
        payments,
    })
}

/// Repository for sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    events: EventBus,
    invoice_prefix: String,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, events: EventBus, invoice_prefix: String) -> Self {
        SaleRepository {
            pool,
            events,
            invoice_prefix,
        }
    }

    /// Creates a PENDING sale.
    ///
    /// ## Returns
    /// * `Err(NotFound)` - Customer, branch or a product missing
    /// * `Err(InvalidDiscountCode)` - Code unknown, inactive, expired, used up
    ///   or not applicable
    /// * `Err(Duplicate)` - Invoice number taken
    pub async fn create(&self, input: NewSale) -> DbResult<SaleAggregate> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let (customer, guest_name, guest_nit) = match &input.customer {
            SaleCustomer::Registered { customer_id } => {
                (Some(fetch_customer(&mut tx, customer_id).await?), None, None)
            }
            SaleCustomer::Guest { name, nit } => {
                validate_name("guest_name", name, 200)?;
                (None, Some(name.trim().to_string()), nit.clone())
            }
        };

        ensure_exists(&mut tx, "branches", "Branch", &input.branch_id).await?;

        let lines = PricedLines::load(&mut tx, &input.lines).await?;
        let gross = lines.gross();

        let code = match input.discount_code.as_deref() {
            Some(text) => {
                let found = find_by_code(&mut tx, text).await?;

                let mut ctx = DiscountContext::new(gross, now);
                if let Some(customer) = &customer {
                    ctx = ctx.for_customer(&customer.id, customer.category_id.clone());
                }
                // A product-bound code applies when its product is on the
                // order; otherwise the first line stands for the order.
                let bound = found.as_ref().and_then(|c| c.product_id.as_ref());
                let product = bound
                    .filter(|bound| input.lines.iter().any(|l| &&l.product_id == bound))
                    .or_else(|| input.lines.first().map(|l| &l.product_id));
                if let Some(product) = product {
                    ctx = ctx.for_product(product.clone());
                }

                let amount = evaluate(found.as_ref(), &ctx)
                    .map_err(|rejection| rejection.into_error(&text.trim().to_uppercase()))?;
                found.map(|code| (code, amount))
            }
            None => None,
        };
        let code_amount = code.as_ref().map(|(_, amount)| *amount).unwrap_or_default();

        let mut manual = Vec::with_capacity(input.manual_discounts.len());
        for discount in &input.manual_discounts {
            manual.push((discount, discount.amount_for(gross)?));
        }
        let manual_amount: Money = manual.iter().map(|(_, amount)| *amount).sum();

        let totals = lines.totals(manual_amount + code_amount)?;

        let invoice_number = match input.invoice_number.as_deref().map(str::trim) {
            Some(number) => {
                validate_name("invoice_number", number, 50)?;
                ensure_unique(&mut tx, "sales", number).await?;
                number.to_string()
            }
            None => next_number(&mut tx, "sales", &self.invoice_prefix).await?,
        };

        let id = new_id();
        debug!(id = %id, invoice_number = %invoice_number, lines = input.lines.len(), "Creating sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, invoice_number, customer_id, guest_name, guest_nit, branch_id, date, status,
                subtotal_cents, tax_cents, discount_cents, total_cents, paid_cents, pending_cents,
                discount_code_id, discount_code_cents, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&invoice_number)
        .bind(customer.as_ref().map(|c| &c.id))
        .bind(&guest_name)
        .bind(&guest_nit)
        .bind(&input.branch_id)
        .bind(input.date.unwrap_or(now))
        .bind(SaleStatus::Pending)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.discount.cents())
        .bind(totals.total.cents())
        .bind(totals.total.cents())
        .bind(code.as_ref().map(|(c, _)| &c.id))
        .bind(code_amount.cents())
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        lines.insert(&mut tx, "sale_details", &id, now).await?;

        for (discount, amount) in &manual {
            sqlx::query(
                r#"
                INSERT INTO sale_discounts (id, sale_id, kind, value, reason, amount_cents, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_id())
            .bind(&id)
            .bind(discount.kind)
            .bind(discount.value)
            .bind(&discount.reason)
            .bind(amount.cents())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let aggregate = fetch_aggregate(&mut tx, &id).await?;
        tx.commit().await?;

        info!(id = %id, invoice_number = %invoice_number, total = %totals.total, "Sale created");
        self.events.publish(DomainEvent::SaleCreated {
            sale_id: id,
            invoice_number,
            total: totals.total,
        });

        Ok(aggregate)
    }

    /// Confirms a PENDING sale, taking its goods out of `branch_id`.
    ///
    /// Stock, customer history, the discount code counter and the status
    /// move together: any failure leaves all of them untouched.
    pub async fn confirm(&self, id: &str, branch_id: &str) -> DbResult<SaleAggregate> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sale = fetch_sale(&mut tx, id).await?;
        if sale.status != SaleStatus::Pending {
            return Err(CoreError::transition(ENTITY, id, sale.status, "confirm").into());
        }
        ensure_exists(&mut tx, "branches", "Branch", branch_id).await?;

        let notes = format!("Sale {}", sale.invoice_number);
        let mut events = Vec::new();

        for line in fetch_lines(&mut tx, "sale_details", id).await? {
            let product = fetch_product(&mut tx, &line.product_id).await?;
            if !product.manage_stock {
                continue;
            }

            let mut input = NewMovement::new(&line.product_id, branch_id, MovementType::Out, line.quantity())
                .completed()
                .with_notes(notes.clone());
            input.reference_id = Some(id.to_string());

            let (_, movement_events) = record(&mut tx, &input, now).await?;
            events.extend(movement_events);
        }

        sqlx::query(
            "UPDATE sales SET status = ?, confirmed_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(SaleStatus::Confirmed)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(SaleStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if let Some(customer_id) = &sale.customer_id {
            record_purchase(&mut tx, customer_id, sale.total(), now).await?;
        }

        if let Some(code_id) = &sale.discount_code_id {
            let code: Option<String> = sqlx::query_scalar("SELECT code FROM discount_codes WHERE id = ?")
                .bind(code_id)
                .fetch_optional(&mut *tx)
                .await?;
            increment_usage(&mut tx, code_id, code.as_deref().unwrap_or(code_id)).await?;
        }

        let aggregate = fetch_aggregate(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            id = %id,
            branch_id = %branch_id,
            total = %sale.total(),
            "Sale confirmed"
        );

        events.push(DomainEvent::SaleConfirmed {
            sale_id: id.to_string(),
            branch_id: branch_id.to_string(),
            total: sale.total(),
        });
        for event in events {
            self.events.publish(event);
        }

        Ok(aggregate)
    }

    /// Cancels a sale. Stock taken at confirmation is not returned; record a
    /// compensating movement for that.
    pub async fn cancel(&self, id: &str) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let sale = fetch_sale(&mut tx, id).await?;
        if sale.status == SaleStatus::Cancelled {
            return Err(CoreError::already(ENTITY, id, sale.status).into());
        }

        sqlx::query("UPDATE sales SET status = ?, updated_at = ? WHERE id = ?")
            .bind(SaleStatus::Cancelled)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sale = fetch_sale(&mut tx, id).await?;
        tx.commit().await?;

        info!(id = %id, "Sale cancelled");
        self.events.publish(DomainEvent::SaleCancelled {
            sale_id: id.to_string(),
        });

        Ok(sale)
    }

    /// Gets a sale with its lines, discounts and payments.
    pub async fn get(&self, id: &str) -> DbResult<SaleAggregate> {
        let mut conn = self.pool.acquire().await?;
        fetch_aggregate(&mut conn, id).await
    }

    /// Lists sales, newest first, optionally by status.
    pub async fn list(&self, status: Option<SaleStatus>) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE deleted_at IS NULL AND (?1 IS NULL OR status = ?1)
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Soft-deletes a sale that has no payments.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(&mut tx, "SELECT COUNT(*) FROM sale_payments WHERE order_id = ?", id).await? {
            return Err(CoreError::HasDependents {
                entity: ENTITY,
                id: id.to_string(),
                dependents: "payments",
            }
            .into());
        }

        soft_delete(&mut tx, "sales", ENTITY, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "sales", ENTITY, id).await
    }

    /// Count and totals of the day's non-cancelled sales (UTC).
    pub async fn daily_summary(&self, date: NaiveDate) -> DbResult<DailySalesSummary> {
        let next = date.succ_opt().ok_or_else(|| ValidationError::InvalidFormat {
            field: "date".to_string(),
            reason: "out of range".to_string(),
        })?;

        // Stored timestamps are RFC 3339, so a day is a half-open string range
        let (count, subtotal, discount, tax, total): (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(subtotal_cents), 0),
                COALESCE(SUM(discount_cents), 0),
                COALESCE(SUM(tax_cents), 0),
                COALESCE(SUM(total_cents), 0)
            FROM sales
            WHERE deleted_at IS NULL AND status != 'cancelled'
              AND date >= ? AND date < ?
            "#,
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(next.format("%Y-%m-%d").to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(DailySalesSummary {
            date,
            count,
            subtotal: Money::from_cents(subtotal),
            discount: Money::from_cents(discount),
            tax: Money::from_cents(tax),
            total: Money::from_cents(total),
        })
    }

    /// The number the next sale without an explicit one will get.
    pub async fn next_invoice_number(&self) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        next_number(&mut conn, "sales", &self.invoice_prefix).await
    }
}
