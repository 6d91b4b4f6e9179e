//! Payment methods (cash, card, bank transfer).

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::validate_name;
use stockroom_core::{CoreError, NewPaymentMethod, PaymentMethod, ValidationError};
use tracing::debug;

use super::{has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;

const ENTITY: &str = "Payment method";

/// Loads an active payment method inside the caller's transaction.
pub(crate) async fn fetch_payment_method(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<PaymentMethod> {
    sqlx::query_as::<_, PaymentMethod>(
        "SELECT * FROM payment_methods WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
}

/// Loads a method a new payment can use: it must exist and be active.
pub(crate) async fn usable_payment_method(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<PaymentMethod> {
    let method = fetch_payment_method(conn, id).await?;

    if !method.is_active {
        return Err(ValidationError::InvalidFormat {
            field: "payment_method_id".to_string(),
            reason: format!("payment method {} is inactive", method.code),
        }
        .into());
    }
    Ok(method)
}

/// Repository for payment methods.
#[derive(Debug, Clone)]
pub struct PaymentMethodRepository {
    pool: SqlitePool,
}

impl PaymentMethodRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentMethodRepository { pool }
    }

    pub async fn create(&self, input: NewPaymentMethod) -> DbResult<PaymentMethod> {
        validate_name("name", &input.name, 100)?;
        validate_name("code", &input.code, 20)?;

        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM payment_methods WHERE name = ? AND deleted_at IS NULL",
            input.name.trim(),
        )
        .await?
        {
            return Err(CoreError::Duplicate {
                field: "payment method name",
                value: input.name,
            }
            .into());
        }

        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, code = %input.code, "Creating payment method");

        sqlx::query(
            r#"
            INSERT INTO payment_methods (
                id, name, code, description, requires_bank_account, is_active,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.code.trim())
        .bind(&input.description)
        .bind(input.requires_bank_account)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let method = fetch_payment_method(&mut tx, &id).await?;
        tx.commit().await?;
        Ok(method)
    }

    pub async fn get(&self, id: &str) -> DbResult<PaymentMethod> {
        let mut conn = self.pool.acquire().await?;
        fetch_payment_method(&mut conn, id).await
    }

    /// Active, non-deleted methods.
    pub async fn list_active(&self) -> DbResult<Vec<PaymentMethod>> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT * FROM payment_methods WHERE is_active = 1 AND deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<PaymentMethod> {
        let result = sqlx::query(
            "UPDATE payment_methods SET is_active = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(ENTITY, id).into());
        }
        self.get(id).await
    }

    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, "payment_methods", ENTITY, id).await
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "payment_methods", ENTITY, id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{self, setup};
    use stockroom_core::ErrorKind;

    #[tokio::test]
    async fn test_inactive_methods_are_hidden() {
        let db = setup().await;
        let cash = testing::payment_method(&db, "CASH", false).await;
        testing::payment_method(&db, "BANK", true).await;
        assert_eq!(db.payment_methods().list_active().await.unwrap().len(), 2);

        let cash = db.payment_methods().set_active(&cash.id, false).await.unwrap();
        assert!(!cash.is_active);
        assert_eq!(db.payment_methods().list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code() {
        let db = setup().await;
        testing::payment_method(&db, "CASH", false).await;

        let err = db
            .payment_methods()
            .create(stockroom_core::NewPaymentMethod {
                name: "Cash again".to_string(),
                code: "CASH".to_string(),
                description: None,
                requires_bank_account: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
