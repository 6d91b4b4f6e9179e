//! # Seed Data Generator
//!
//! Populates a database with demo master data and walks one order through
//! the whole back-office flow.
//!
//! ## Usage
//! ```bash
//! # Use STOCKROOM_* environment configuration
//! cargo run -p stockroom-db --bin seed
//!
//! # Specify database path
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom.db
//!
//! # More detail
//! RUST_LOG=debug cargo run -p stockroom-db --bin seed
//! ```
//!
//! ## Flow
//! ```text
//! master data ──► purchase ──► receive @ Central ──► transfer → North
//!                                                        │
//!              pay ◄── confirm @ Central ◄── sale (code) ◄┘
//! ```

use chrono::{Duration, Utc};
use std::env;
use stockroom_core::{
    DiscountScope, DiscountValue, LineInput, ManualDiscount, Money, NewBranch, NewCustomer,
    NewCustomerCategory, NewDiscountCode, NewPayment, NewPaymentMethod, NewProduct, NewPurchase,
    NewSale, NewSupplier, NewTransfer, Percent, Quantity, SaleCustomer,
};
use stockroom_db::{Database, DbConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// (sku, name, cost cents, price cents)
const PRODUCTS: &[(&str, &str, i64, i64)] = &[
    ("BEV-001", "Mineral Water 600ml", 350, 600),
    ("BEV-002", "Orange Juice 1L", 900, 1500),
    ("SNK-001", "Salted Peanuts 200g", 700, 1200),
    ("GRC-001", "Long Grain Rice 1kg", 1100, 1800),
    ("GRC-002", "Black Beans 800g", 1300, 2100),
];

/// (name, discount %, minimum lifetime purchases in cents)
const TIERS: &[(&str, i64, i64)] = &[("Silver", 2, 50_000), ("Gold", 5, 250_000)];

fn print_help() {
    println!("Stockroom Seed Data Generator");
    println!();
    println!("Usage: seed [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --db <PATH>    Database file path (default: STOCKROOM_DATABASE_PATH or ./stockroom.db)");
    println!("  -h, --help         Show this help message");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn")),
        )
        .init();

    let mut config = DbConfig::from_env()?;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    println!("🌱 Stockroom Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!();

    let db = Database::new(config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // -------------------------------------------------------------------------
    // Master data
    // -------------------------------------------------------------------------

    let central = db.branches().create(NewBranch::named("Central")).await?;
    let north = db.branches().create(NewBranch::named("North")).await?;
    let grocery = db.categories().create("Grocery", Some("Dry goods and drinks")).await?;
    let piece = db.units().create("Piece", "pc").await?;

    let mut products = Vec::with_capacity(PRODUCTS.len());
    for (sku, name, cost, price) in PRODUCTS {
        let product = db
            .products()
            .create(NewProduct {
                category_id: Some(grocery.id.clone()),
                unit_id: Some(piece.id.clone()),
                ..NewProduct::new(*name, *sku, Money::from_cents(*cost), Money::from_cents(*price))
            })
            .await?;
        products.push(product);
    }
    println!("✓ {} branches, {} products", 2, products.len());

    let supplier = db
        .suppliers()
        .create(NewSupplier {
            name: "Distribuidora del Valle".to_string(),
            nit: Some("1234567-8".to_string()),
            ..Default::default()
        })
        .await?;

    for (name, discount, min_purchase) in TIERS {
        db.customer_categories()
            .create(NewCustomerCategory {
                name: name.to_string(),
                discount: Percent::from_whole(*discount),
                min_purchase: Money::from_cents(*min_purchase),
                is_active: true,
            })
            .await?;
    }

    let customer = db
        .customers()
        .create(NewCustomer {
            name: "María López".to_string(),
            nit: Some("9876543-2".to_string()),
            ..Default::default()
        })
        .await?;

    let cash = db
        .payment_methods()
        .create(NewPaymentMethod {
            name: "Cash".to_string(),
            code: "CASH".to_string(),
            description: None,
            requires_bank_account: false,
        })
        .await?;
    let transfer_method = db
        .payment_methods()
        .create(NewPaymentMethod {
            name: "Bank transfer".to_string(),
            code: "BANK".to_string(),
            description: None,
            requires_bank_account: true,
        })
        .await?;

    let now = Utc::now();
    let welcome = db
        .discount_codes()
        .create(NewDiscountCode {
            code: "WELCOME10".to_string(),
            description: Some("10% off the first order".to_string()),
            discount: DiscountValue::Percentage(Percent::from_whole(10)),
            scope: DiscountScope::Global,
            min_purchase: Some(Money::from_cents(5_000)),
            max_discount: Some(Money::from_cents(2_500)),
            usage_limit: Some(100),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
            customer_category_id: None,
            product_id: None,
            customer_id: None,
        })
        .await?;
    println!("✓ Supplier, customer tiers, payment methods, discount code {}", welcome.code);

    // -------------------------------------------------------------------------
    // Purchase → receive → pay
    // -------------------------------------------------------------------------

    let purchase = db
        .purchases()
        .create(NewPurchase {
            invoice_number: None,
            supplier_id: supplier.id.clone(),
            date: None,
            due_date: Some(now + Duration::days(30)),
            notes: Some("Opening stock".to_string()),
            lines: products
                .iter()
                .map(|p| {
                    LineInput::new(&p.id, Quantity::from_units(24), p.cost())
                        .with_tax(Percent::from_whole(12))
                })
                .collect(),
        })
        .await?;
    let purchase_id = purchase.purchase.id.clone();
    info!(invoice = %purchase.purchase.invoice_number, total = %purchase.purchase.total(), "Seed purchase created");

    let received = db.purchases().receive(&purchase_id, &central.id).await?;
    println!(
        "✓ Purchase {} received at {} ({} movements)",
        purchase.purchase.invoice_number,
        central.name,
        received.len()
    );

    db.purchase_payments()
        .apply(
            NewPayment::new(&purchase_id, &transfer_method.id, purchase.purchase.total())
                .with_bank_account("GT-0001-2233"),
        )
        .await?;
    let purchase = db.purchases().get(&purchase_id).await?;
    println!("✓ Purchase paid, status {}", purchase.purchase.status);

    // -------------------------------------------------------------------------
    // Transfer
    // -------------------------------------------------------------------------

    let transfer = db
        .transfers()
        .create(NewTransfer {
            product_id: products[0].id.clone(),
            from_branch_id: central.id.clone(),
            to_branch_id: north.id.clone(),
            quantity: Quantity::from_units(6),
            notes: Some("Weekly restock".to_string()),
        })
        .await?;
    db.transfers().complete(&transfer.reference_id).await?;
    println!("✓ Transferred 6 × {} to {}", products[0].sku, north.name);

    // -------------------------------------------------------------------------
    // Sale → confirm → pay
    // -------------------------------------------------------------------------

    let sale = db
        .sales()
        .create(NewSale {
            invoice_number: None,
            customer: SaleCustomer::Registered {
                customer_id: customer.id.clone(),
            },
            branch_id: central.id.clone(),
            date: None,
            discount_code: Some(welcome.code.clone()),
            manual_discounts: vec![ManualDiscount::amount(Money::from_cents(100), "rounding")],
            notes: None,
            lines: products
                .iter()
                .take(3)
                .map(|p| {
                    LineInput::new(&p.id, Quantity::from_units(4), p.price())
                        .with_tax(Percent::from_whole(12))
                })
                .collect(),
        })
        .await?;
    let sale_id = sale.sale.id.clone();

    let sale = db.sales().confirm(&sale_id, &central.id).await?;
    println!(
        "✓ Sale {} confirmed, total {} (discount {})",
        sale.sale.invoice_number,
        sale.sale.total(),
        sale.sale.discount_cents
    );

    db.sale_payments()
        .apply(NewPayment::new(&sale_id, &cash.id, sale.sale.total()))
        .await?;
    let sale = db.sales().get(&sale_id).await?;
    println!("✓ Sale paid, settlement {:?}", sale.sale.settlement_status());

    // -------------------------------------------------------------------------
    // Summary
    // -------------------------------------------------------------------------

    println!();
    let stats = db.stock().inventory_stats(None).await?;
    println!("Inventories: {}", stats.total_products);
    println!("Low stock:   {}", stats.low_stock);
    println!("Stock value: {}", stats.total_value);

    let summary = db.sales().daily_summary(Utc::now().date_naive()).await?;
    println!("Sales today: {} for {}", summary.count, summary.total);

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
