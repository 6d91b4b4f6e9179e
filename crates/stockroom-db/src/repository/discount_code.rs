//! # Discount Code Repository
//!
//! Storage for discount codes. Evaluation itself is pure and lives in
//! [`stockroom_core::discount`].
//!
//! ```text
//! validate(code, ctx)  ── lookup by upper-cased code ──► discount::evaluate
//! apply(code)          ── UPDATE ... used_count + 1
//!                         WHERE usage_limit IS NULL OR used_count < usage_limit
//! ```
//!
//! The guarded UPDATE is what keeps `used_count ≤ usage_limit` under
//! concurrent confirmations: the losing writer matches zero rows.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::discount::evaluate;
use stockroom_core::validation::{
    validate_discount_code, validate_discount_value, validate_non_negative_money,
    validate_validity_window,
};
use stockroom_core::{
    CoreError, DiscountCode, DiscountContext, DiscountRejection, DiscountScope, DiscountValidation,
    NewDiscountCode, ValidationError,
};
use tracing::{debug, info};

use super::{ensure_exists, has_rows, new_id, restore, soft_delete};
use crate::error::DbResult;

const ENTITY: &str = "Discount code";

/// Codes are matched case-insensitively and stored upper-case.
fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

async fn fetch_discount_code(conn: &mut SqliteConnection, id: &str) -> DbResult<DiscountCode> {
    sqlx::query_as::<_, DiscountCode>(
        "SELECT * FROM discount_codes WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found(ENTITY, id).into())
}

/// Looks up a live code by its text, ignoring case.
pub(crate) async fn find_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> DbResult<Option<DiscountCode>> {
    let found = sqlx::query_as::<_, DiscountCode>(
        "SELECT * FROM discount_codes WHERE code = ? AND deleted_at IS NULL",
    )
    .bind(normalize(code))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(found)
}

/// Counts one use of the code, refusing to pass its usage limit.
pub(crate) async fn increment_usage(
    conn: &mut SqliteConnection,
    id: &str,
    code: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE discount_codes
        SET used_count = used_count + 1, updated_at = ?
        WHERE id = ? AND deleted_at IS NULL
          AND (usage_limit IS NULL OR used_count < usage_limit)
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DiscountRejection::UsageLimitReached.into_error(code).into());
    }
    Ok(())
}

/// Repository for discount codes.
#[derive(Debug, Clone)]
pub struct DiscountCodeRepository {
    pool: SqlitePool,
}

impl DiscountCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DiscountCodeRepository { pool }
    }

    /// Creates a discount code.
    ///
    /// Scoped codes must name the category, product or customer they are
    /// bound to, and it must exist.
    pub async fn create(&self, input: NewDiscountCode) -> DbResult<DiscountCode> {
        let now = Utc::now();

        validate_discount_code(&input.code)?;
        validate_discount_value(&input.discount)?;
        validate_validity_window(input.valid_from, input.valid_until, now)?;
        if let Some(min) = input.min_purchase {
            validate_non_negative_money("min_purchase", min)?;
        }
        if let Some(max) = input.max_discount {
            validate_non_negative_money("max_discount", max)?;
        }
        if input.usage_limit.is_some_and(|limit| limit <= 0) {
            return Err(ValidationError::MustBePositive {
                field: "usage_limit".to_string(),
            }
            .into());
        }

        let code = normalize(&input.code);
        let mut tx = self.pool.begin().await?;

        let bound = match input.scope {
            DiscountScope::Global => None,
            DiscountScope::Category => Some((
                "customer_category_id",
                "customer_categories",
                "Customer category",
                &input.customer_category_id,
            )),
            DiscountScope::Product => Some(("product_id", "products", "Product", &input.product_id)),
            DiscountScope::Customer => {
                Some(("customer_id", "customers", "Customer", &input.customer_id))
            }
        };
        if let Some((field, table, entity, id)) = bound {
            let id = id.as_deref().ok_or_else(|| ValidationError::Required {
                field: field.to_string(),
            })?;
            ensure_exists(&mut tx, table, entity, id).await?;
        }

        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_codes WHERE code = ?")
            .bind(&code)
            .fetch_one(&mut *tx)
            .await?;
        if taken > 0 {
            return Err(CoreError::Duplicate {
                field: "discount code",
                value: code,
            }
            .into());
        }

        let id = new_id();
        debug!(id = %id, code = %code, scope = ?input.scope, "Creating discount code");

        sqlx::query(
            r#"
            INSERT INTO discount_codes (
                id, code, description, discount_type, value, scope,
                min_purchase_cents, max_discount_cents, usage_limit, used_count,
                valid_from, valid_until, is_active,
                customer_category_id, product_id, customer_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&code)
        .bind(&input.description)
        .bind(input.discount.discount_type())
        .bind(input.discount.raw())
        .bind(input.scope)
        .bind(input.min_purchase.map(|m| m.cents()))
        .bind(input.max_discount.map(|m| m.cents()))
        .bind(input.usage_limit)
        .bind(input.valid_from)
        .bind(input.valid_until)
        .bind(&input.customer_category_id)
        .bind(&input.product_id)
        .bind(&input.customer_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let created = fetch_discount_code(&mut tx, &id).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> DbResult<DiscountCode> {
        let mut conn = self.pool.acquire().await?;
        fetch_discount_code(&mut conn, id).await
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<DiscountCode> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, normalize(code)).into())
    }

    /// Codes that could be redeemed at `now`: active, inside their window
    /// and below their usage limit.
    pub async fn list_active(&self, now: DateTime<Utc>) -> DbResult<Vec<DiscountCode>> {
        let codes = sqlx::query_as::<_, DiscountCode>(
            "SELECT * FROM discount_codes WHERE is_active = 1 AND deleted_at IS NULL ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(codes
            .into_iter()
            .filter(|c| c.valid_from <= now && now <= c.valid_until && !c.usage_exhausted())
            .collect())
    }

    /// Evaluates `code` against `ctx` without consuming a use.
    pub async fn validate(&self, code: &str, ctx: &DiscountContext) -> DbResult<DiscountValidation> {
        let mut conn = self.pool.acquire().await?;
        let found = find_by_code(&mut conn, code).await?;

        let result = evaluate(found.as_ref(), ctx);
        if let Err(rejection) = &result {
            debug!(code = %normalize(code), reason = %rejection, "Discount code rejected");
        }
        Ok(result.into())
    }

    /// Consumes one use of `code`.
    pub async fn apply(&self, code: &str) -> DbResult<DiscountCode> {
        let mut tx = self.pool.begin().await?;

        let found = find_by_code(&mut tx, code)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, normalize(code)))?;
        increment_usage(&mut tx, &found.id, &found.code).await?;

        let updated = fetch_discount_code(&mut tx, &found.id).await?;
        tx.commit().await?;

        info!(code = %updated.code, used = updated.used_count, "Discount code applied");
        Ok(updated)
    }

    /// Flips `is_active`.
    pub async fn toggle_active(&self, id: &str) -> DbResult<DiscountCode> {
        let result = sqlx::query(
            r#"
            UPDATE discount_codes SET is_active = NOT is_active, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(ENTITY, id).into());
        }
        self.get(id).await
    }

    /// Soft-deletes a code no sale refers to.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if has_rows(
            &mut tx,
            "SELECT COUNT(*) FROM sales WHERE discount_code_id = ? AND deleted_at IS NULL",
            id,
        )
        .await?
        {
            return Err(CoreError::HasDependents {
                entity: ENTITY,
                id: id.to_string(),
                dependents: "sales",
            }
            .into());
        }

        soft_delete(&mut tx, "discount_codes", ENTITY, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn restore(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        restore(&mut conn, "discount_codes", ENTITY, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cents, setup};
    use chrono::Duration;
    use stockroom_core::{DiscountValue, ErrorKind, Percent};

    fn code(text: &str, discount: DiscountValue) -> NewDiscountCode {
        let now = Utc::now();
        NewDiscountCode {
            code: text.to_string(),
            description: None,
            discount,
            scope: DiscountScope::Global,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            customer_category_id: None,
            product_id: None,
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_code() {
        let db = setup().await;

        let created = db
            .discount_codes()
            .create(code(" summer-10 ", DiscountValue::Percentage(Percent::from_whole(10))))
            .await
            .unwrap();
        assert_eq!(created.code, "SUMMER-10");
        assert_eq!(created.value, 1000);
        assert_eq!(created.used_count, 0);

        let found = db.discount_codes().get_by_code("Summer-10").await.unwrap();
        assert_eq!(found.id, created.id);

        let err = db
            .discount_codes()
            .create(code("SUMMER-10", DiscountValue::FixedAmount(cents(500))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let db = setup().await;

        let bad_value = code("ZERO", DiscountValue::Percentage(Percent::zero()));
        let err = db.discount_codes().create(bad_value).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut window = code("WINDOW", DiscountValue::FixedAmount(cents(100)));
        window.valid_until = window.valid_from;
        let err = db.discount_codes().create(window).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut scoped = code("VIP", DiscountValue::FixedAmount(cents(100)));
        scoped.scope = DiscountScope::Customer;
        let err = db.discount_codes().create(scoped.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        scoped.customer_id = Some("missing".to_string());
        let err = db.discount_codes().create(scoped).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .discount_codes()
            .create(code("no spaces", DiscountValue::FixedAmount(cents(100))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_validate_percentage_with_cap() {
        let db = setup().await;
        let mut input = code("SAVE20", DiscountValue::Percentage(Percent::from_whole(20)));
        input.min_purchase = Some(cents(5000));
        input.max_discount = Some(cents(1500));
        db.discount_codes().create(input).await.unwrap();

        let ctx = DiscountContext::new(cents(10_000), Utc::now());
        let result = db.discount_codes().validate("save20", &ctx).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.discount_amount, cents(1500));

        let ctx = DiscountContext::new(cents(4000), Utc::now());
        let result = db.discount_codes().validate("SAVE20", &ctx).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.discount_amount, cents(0));

        let ctx = DiscountContext::new(cents(10_000), Utc::now() + Duration::days(60));
        let result = db.discount_codes().validate("SAVE20", &ctx).await.unwrap();
        assert!(!result.is_valid);

        let result = db.discount_codes().validate("NOPE", &ctx).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.message.as_deref(), Some("discount code not found"));
    }

    #[tokio::test]
    async fn test_category_scope() {
        let db = setup().await;
        let gold = db
            .customer_categories()
            .create(stockroom_core::NewCustomerCategory {
                name: "Gold".to_string(),
                discount: Percent::from_whole(5),
                min_purchase: cents(100_000),
                is_active: true,
            })
            .await
            .unwrap();

        let mut input = code("GOLD-ONLY", DiscountValue::FixedAmount(cents(500)));
        input.scope = DiscountScope::Category;
        input.customer_category_id = Some(gold.id.clone());
        db.discount_codes().create(input).await.unwrap();

        let ctx = DiscountContext::new(cents(2000), Utc::now());
        let result = db.discount_codes().validate("GOLD-ONLY", &ctx).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("customer required for this discount code"));

        let ctx = DiscountContext::new(cents(2000), Utc::now()).for_customer("c-1", None);
        let result = db.discount_codes().validate("GOLD-ONLY", &ctx).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("customer not in required category"));

        let ctx = DiscountContext::new(cents(2000), Utc::now()).for_customer("c-1", Some(gold.id));
        let result = db.discount_codes().validate("GOLD-ONLY", &ctx).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.discount_amount, cents(500));
    }

    #[tokio::test]
    async fn test_apply_respects_usage_limit() {
        let db = setup().await;
        let mut input = code("ONCE", DiscountValue::FixedAmount(cents(100)));
        input.usage_limit = Some(1);
        db.discount_codes().create(input).await.unwrap();

        let applied = db.discount_codes().apply("once").await.unwrap();
        assert_eq!(applied.used_count, 1);

        let err = db.discount_codes().apply("ONCE").await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InvalidDiscountCode { .. })));
        assert_eq!(db.discount_codes().get(&applied.id).await.unwrap().used_count, 1);

        assert!(db.discount_codes().list_active(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_and_list_active() {
        let db = setup().await;
        let a = db
            .discount_codes()
            .create(code("AAA", DiscountValue::FixedAmount(cents(100))))
            .await
            .unwrap();
        db.discount_codes()
            .create(code("BBB", DiscountValue::FixedAmount(cents(100))))
            .await
            .unwrap();
        assert_eq!(db.discount_codes().list_active(Utc::now()).await.unwrap().len(), 2);

        let toggled = db.discount_codes().toggle_active(&a.id).await.unwrap();
        assert!(!toggled.is_active);
        assert_eq!(db.discount_codes().list_active(Utc::now()).await.unwrap().len(), 1);

        let ctx = DiscountContext::new(cents(1000), Utc::now());
        let result = db.discount_codes().validate("AAA", &ctx).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("discount code is not active"));

        let later = Utc::now() + Duration::days(45);
        assert!(db.discount_codes().list_active(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let db = setup().await;
        let created = db
            .discount_codes()
            .create(code("GONE", DiscountValue::FixedAmount(cents(100))))
            .await
            .unwrap();

        db.discount_codes().soft_delete(&created.id).await.unwrap();
        let err = db.discount_codes().get_by_code("GONE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        db.discount_codes().restore(&created.id).await.unwrap();
        db.discount_codes().get_by_code("GONE").await.unwrap();
    }
}
