//! # Seed Data Generator
//!
//! Populates a store with a small demo setup for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p kasse-db --bin seed
//!
//! # Specify database path
//! cargo run -p kasse-db --bin seed -- --db ./data/kasse.db
//! ```
//!
//! ## Generated Data
//! - Products: Wasser (1.50) and Cola (2.00) on page 1, Mate (2.50) on page 2
//! - Alice `TESTCARD123` with 10.00, Bob `TESTCARD456` with 5.00
//! - Event account "Sommerfest", staff account `ADMINCARD1`

use std::env;
use std::sync::Arc;

use kasse_core::{AccountCategory, AccountDraft, Money, NoopNotifier, ProductDraft, SystemClock};
use kasse_db::{Database, DbConfig};

const PRODUCTS: &[(&str, i64, i64, i64)] = &[
    // (name, price_cents, stock, page)
    ("Wasser", 150, 24, 1),
    ("Cola", 200, 24, 1),
    ("Mate", 250, 12, 2),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kasse_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasse Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./kasse_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Kasse Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let cash_id = db.bootstrap().await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied, cash account #{}", cash_id);

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Creating products...");
    for (name, price, stock, page) in PRODUCTS {
        let product = db
            .products()
            .insert(&ProductDraft::new(*name, *price).with_stock(*stock).on_page(*page))
            .await?;
        println!("  #{} {} {} (stock {})", product.id, product.name, product.price(), product.stock);
    }

    println!();
    println!("Creating accounts...");
    let ledger = db.ledger(Arc::new(SystemClock), Arc::new(NoopNotifier));

    let accounts = [
        (AccountDraft::standard("Alice").with_token("TESTCARD123"), 1000),
        (AccountDraft::standard("Bob").with_token("TESTCARD456"), 500),
        (
            AccountDraft::standard("Sommerfest").with_category(AccountCategory::Event),
            0,
        ),
        (
            AccountDraft::standard("Staff")
                .with_token("ADMINCARD1")
                .with_category(AccountCategory::Admin),
            0,
        ),
    ];

    for (draft, opening) in accounts {
        let account = match db.accounts().insert(&draft).await {
            Ok(account) => account,
            Err(e) => {
                eprintln!("Failed to insert {}: {}", draft.name, e);
                continue;
            }
        };
        if opening > 0 {
            ledger.top_up(account.id, Money::from_cents(opening)).await?;
        }
        println!(
            "  #{} {} [{}] {}",
            account.id,
            account.name,
            account.category.as_str(),
            Money::from_cents(opening)
        );
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
