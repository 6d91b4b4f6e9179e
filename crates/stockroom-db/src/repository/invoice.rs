//! Invoice number generation shared by purchases and sales.

use chrono::{Datelike, Utc};
use sqlx::SqliteConnection;
use stockroom_core::invoice::{next_invoice_number, parse_sequence};
use stockroom_core::CoreError;

use crate::error::DbResult;

/// Next `{PREFIX}-{YYYY}-{NNNN}` for `table`, from the highest number issued
/// this calendar year. Soft-deleted orders still hold their number.
pub(crate) async fn next_number(
    conn: &mut SqliteConnection,
    table: &'static str,
    prefix: &str,
) -> DbResult<String> {
    let year = Utc::now().year();
    let pattern = format!("{prefix}-{year}-%");

    let sql = format!("SELECT invoice_number FROM {table} WHERE invoice_number LIKE ?");
    let numbers: Vec<String> = sqlx::query_scalar(&sql)
        .bind(&pattern)
        .fetch_all(&mut *conn)
        .await?;

    // Lexical MAX breaks past 9999, so compare parsed sequences
    let last = numbers
        .iter()
        .filter_map(|number| parse_sequence(prefix, year, number).map(|seq| (seq, number)))
        .max_by_key(|(seq, _)| *seq)
        .map(|(_, number)| number.as_str());

    Ok(next_invoice_number(prefix, year, last))
}

/// Fails with Duplicate when `number` is already used in `table`.
pub(crate) async fn ensure_unique(
    conn: &mut SqliteConnection,
    table: &'static str,
    number: &str,
) -> DbResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE invoice_number = ?");
    let taken: i64 = sqlx::query_scalar(&sql)
        .bind(number)
        .fetch_one(&mut *conn)
        .await?;

    if taken > 0 {
        return Err(CoreError::Duplicate {
            field: "invoice_number",
            value: number.to_string(),
        }
        .into());
    }
    Ok(())
}
