//! Order line rows, shared by purchases and sales.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockroom_core::lines::aggregate;
use stockroom_core::validation::validate_order_lines;
use stockroom_core::{LineAmounts, LineInput, Money, OrderLine, OrderTotals};

use super::new_id;
use super::product::fetch_product;
use crate::error::DbResult;

/// Lines validated against the catalog, with their computed amounts.
pub(crate) struct PricedLines<'a> {
    pub inputs: &'a [LineInput],
    pub amounts: Vec<LineAmounts>,
}

impl<'a> PricedLines<'a> {
    /// Checks the line count, that every product is active, and computes
    /// each line.
    pub async fn load(conn: &mut SqliteConnection, inputs: &'a [LineInput]) -> DbResult<Self> {
        validate_order_lines(inputs.len())?;

        let mut amounts = Vec::with_capacity(inputs.len());
        for line in inputs {
            fetch_product(conn, &line.product_id).await?;
            amounts.push(line.amounts()?);
        }

        Ok(PricedLines { inputs, amounts })
    }

    /// Σ quantity × unit price, before any discount.
    pub fn gross(&self) -> Money {
        self.amounts.iter().map(|a| a.subtotal).sum()
    }

    pub fn totals(&self, extra_discount: Money) -> DbResult<OrderTotals> {
        Ok(aggregate(&self.amounts, extra_discount)?)
    }

    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        table: &'static str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} (
                id, order_id, product_id, quantity_milli, unit_price_cents,
                discount_bps, discount_cents, tax_bps, tax_cents, line_total_cents, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );

        for (line, amounts) in self.inputs.iter().zip(&self.amounts) {
            sqlx::query(&sql)
                .bind(new_id())
                .bind(order_id)
                .bind(&line.product_id)
                .bind(line.quantity.milli())
                .bind(line.unit_price.cents())
                .bind(line.discount.bps())
                .bind(amounts.discount.cents())
                .bind(line.tax.bps())
                .bind(amounts.tax.cents())
                .bind(amounts.total.cents())
                .bind(now)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

pub(crate) async fn fetch_lines(
    conn: &mut SqliteConnection,
    table: &'static str,
    order_id: &str,
) -> DbResult<Vec<OrderLine>> {
    let sql = format!("SELECT * FROM {table} WHERE order_id = ? ORDER BY created_at, rowid");

    let lines = sqlx::query_as::<_, OrderLine>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(lines)
}
