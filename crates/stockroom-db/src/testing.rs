//! Shared fixtures for repository tests.

use stockroom_core::{
    Branch, Customer, Money, Movement, MovementType, NewBranch, NewCustomer, NewMovement,
    NewPaymentMethod, NewProduct, NewSupplier, PaymentMethod, Product, Quantity, Supplier,
};

use crate::pool::{Database, DbConfig};

pub(crate) async fn setup() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub(crate) fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

pub(crate) fn units(n: i64) -> Quantity {
    Quantity::from_units(n)
}

pub(crate) async fn branch(db: &Database, name: &str) -> Branch {
    db.branches().create(NewBranch::named(name)).await.unwrap()
}

pub(crate) async fn product(db: &Database, sku: &str, cost_cents: i64, price_cents: i64) -> Product {
    db.products()
        .create(NewProduct::new(
            format!("Product {sku}"),
            sku,
            cents(cost_cents),
            cents(price_cents),
        ))
        .await
        .unwrap()
}

pub(crate) async fn supplier(db: &Database, name: &str) -> Supplier {
    db.suppliers()
        .create(NewSupplier {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub(crate) async fn customer(db: &Database, name: &str) -> Customer {
    db.customers()
        .create(NewCustomer {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub(crate) async fn payment_method(db: &Database, code: &str, requires_bank_account: bool) -> PaymentMethod {
    db.payment_methods()
        .create(NewPaymentMethod {
            name: format!("Method {code}"),
            code: code.to_string(),
            description: None,
            requires_bank_account,
        })
        .await
        .unwrap()
}

/// Puts `n` units of `product` on the shelf at `branch`.
pub(crate) async fn stock_in(db: &Database, product: &Product, branch: &Branch, n: i64) -> Movement {
    db.stock()
        .record_movement(NewMovement::new(&product.id, &branch.id, MovementType::In, units(n)).completed())
        .await
        .unwrap()
}

pub(crate) async fn stock_of(db: &Database, product: &Product, branch: &Branch) -> Quantity {
    db.stock()
        .get_inventory(&product.id, &branch.id)
        .await
        .unwrap()
        .map(|inv| inv.stock())
        .unwrap_or_default()
}
