//! # Demo Catalog Seeder
//!
//! Populates a database with a small café catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in tally.toml (or ./tally.db)
//! cargo run -p tally-service --bin seed
//!
//! # Explicit config file, or override the path directly
//! cargo run -p tally-service --bin seed -- --config ./tally.toml
//! TALLY_DATABASE_PATH=./data/dev.db cargo run -p tally-service --bin seed
//! ```
//!
//! ## Generated Catalog
//! - Units: `pcs` (whole), `kg` (3 decimals)
//! - One store and one till device
//! - Products with opening stock booked as `STOCK_IN` movements, so the
//!   ledger and the cached counters agree from the start
//! - A required `Size` attribute on drinks and an optional `Milk` modifier
//!   group
//! - An order-level 10% discount and a fixed discount on pastries

use std::env;
use std::path::PathBuf;

use tally_core::inventory::AdjustStockInput;
use tally_core::{DiscountScope, DiscountType, MovementReason, Quantity, SelectionType};
use tally_db::{Database, NewDiscount, NewProduct};
use tally_service::{telemetry, InventoryService, ServiceConfig};
use tracing::{info, warn};

/// (name, sku, price in minor units, opening stock, reorder point)
const DRINKS: &[(&str, &str, i64, &str, i64)] = &[
    ("Espresso", "DRK-ESP", 300, "200", 20),
    ("Cappuccino", "DRK-CAP", 450, "200", 20),
    ("Flat White", "DRK-FLW", 480, "150", 20),
    ("Iced Latte", "DRK-ICL", 520, "120", 15),
    ("Chai Latte", "DRK-CHA", 470, "80", 10),
];

const PASTRIES: &[(&str, &str, i64, &str, i64)] = &[
    ("Croissant", "PST-CRO", 350, "40", 8),
    ("Pain au Chocolat", "PST-PAC", 390, "30", 8),
    ("Blueberry Muffin", "PST-MUF", 320, "24", 6),
    ("Cinnamon Roll", "PST-CIN", 410, "3", 6),
];

/// Sold by weight.
const BEANS: &[(&str, &str, i64, &str, i64)] = &[
    ("House Blend Beans", "BNS-HSE", 2400, "12.5", 5),
    ("Single Origin Beans", "BNS-SGL", 3200, "4.25", 5),
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Shelf {
    Drinks,
    Pastries,
    Beans,
}

const SIZES: &[&str] = &["Small", "Medium", "Large"];

/// (name, price delta in minor units)
const MILKS: &[(&str, i64)] = &[("Oat", 60), ("Almond", 60), ("Soy", 50), ("Extra shot", 80)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Demo Catalog Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: ./tally.toml if present)");
                println!("  -h, --help           Show this help message");
                println!();
                println!("Environment: TALLY_DATABASE_PATH, TALLY_DEFAULT_BUSINESS_ID, TALLY_LOG_LEVEL");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(|| PathBuf::from("tally.toml"));
    let config = ServiceConfig::load(Some(config_path.as_path()))?;
    telemetry::init(&config.log.level);

    let business = config.business.default_id.clone();
    info!(path = ?config.database.path, business = %business, "Seeding database");

    let db = Database::new(config.db_config()).await?;
    let (products_at, _) = db.inventory().watermark(&business).await?;
    if products_at.is_some() {
        warn!("Database already has products for this business, skipping seed");
        println!("Database already seeded. Delete the file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let inventory = InventoryService::new(db.clone(), config.inventory.clone());
    let catalog = db.catalog();

    let pcs = catalog.insert_unit(&business, "pcs", 0).await?;
    let kg = catalog.insert_unit(&business, "kg", 3).await?;
    let store = catalog.insert_store(&business, "Main Street").await?;
    let till = catalog.insert_device(&business, "Front counter till").await?;
    info!(store = %store.id, device = %till.id, "Store and device created");

    let size = catalog
        .insert_attribute(&business, "Size", SelectionType::Single, true)
        .await?;
    for (sort, name) in SIZES.iter().enumerate() {
        catalog.insert_attribute_option(&size, name, sort as i64).await?;
    }

    let milk = catalog
        .insert_modifier_group(&business, "Milk & extras", 0, Some(2))
        .await?;
    for (sort, (name, delta)) in MILKS.iter().enumerate() {
        catalog
            .insert_modifier_option(&milk, name, *delta, sort as i64)
            .await?;
    }

    let mut seeded = 0;
    let mut pastry_ids = Vec::new();
    let shelves = [
        (Shelf::Drinks, DRINKS, &pcs.id),
        (Shelf::Pastries, PASTRIES, &pcs.id),
        (Shelf::Beans, BEANS, &kg.id),
    ];
    for (shelf, items, unit_id) in shelves {
        for (name, sku, price, opening, reorder) in items.iter() {
            let product = catalog
                .insert_product(
                    &NewProduct::new(&business, *name)
                        .sku(*sku)
                        .unit(unit_id.as_str())
                        .price_minor(*price)
                        .reorder(Quantity::from_units(*reorder)?, None),
                )
                .await?;

            inventory
                .adjust_stock(
                    &business,
                    &AdjustStockInput {
                        product_id: product.id.clone(),
                        store_id: Some(store.id.clone()),
                        quantity_delta: opening.to_string(),
                        reason: MovementReason::StockIn,
                        idempotency_key: Some(format!("seed-opening-{}", sku)),
                        note: Some("Opening stock".to_string()),
                    },
                    None,
                )
                .await?;

            match shelf {
                Shelf::Drinks => {
                    catalog.link_product_attribute(&product.id, &size, None, 0).await?;
                    catalog.link_product_modifier_group(&product.id, &milk, 0).await?;
                }
                Shelf::Pastries => pastry_ids.push(product.id.clone()),
                Shelf::Beans => {}
            }
            seeded += 1;
        }
    }

    catalog
        .insert_discount(&NewDiscount {
            business_id: business.clone(),
            name: "Loyalty 10%".to_string(),
            discount_type: DiscountType::Percent,
            scope: DiscountScope::Order,
            value_minor: 1_000,
            product_id: None,
        })
        .await?;
    if let Some(croissant) = pastry_ids.first() {
        catalog
            .insert_discount(&NewDiscount {
                business_id: business.clone(),
                name: "Day-old croissant".to_string(),
                discount_type: DiscountType::Fixed,
                scope: DiscountScope::Product,
                value_minor: 150,
                product_id: Some(croissant.clone()),
            })
            .await?;
    }

    let low = inventory.list_low_stock(&business, None).await?;
    info!(
        products = seeded,
        low_stock = low.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );
    println!("Seeded {} products ({} below reorder point)", seeded, low.len());

    db.close().await;
    Ok(())
}
