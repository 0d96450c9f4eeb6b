//! # Seed Data Generator
//!
//! Populates the database with a development catalog.
//!
//! ## Usage
//! ```bash
//! # Seed the default catalog (every product below)
//! cargo run -p mercado-db --bin seed
//!
//! # Seed at most N products
//! cargo run -p mercado-db --bin seed -- --count 20
//!
//! # Specify database path
//! cargo run -p mercado-db --bin seed -- --db ./data/mercado.db
//! ```
//!
//! ## Generated Data
//! - One category per group below
//! - Unit products with whole stock, weight products (kg) with fractional stock
//! - Barcodes `779{index:010}`
//! - Two promotions: 10% over 15000 and a breakfast combo

use mercado_core::promotion::{ActivityWindow, ComboRequirement, DiscountShape, PromotionRule};
use mercado_core::{DiscountRate, Money, Product, UnitType};
use mercado_db::telemetry::init_tracing;
use mercado_db::{Database, DbConfig, NewProduct, NewPromotion};
use std::env;
use tracing::warn;

const OPERATOR: &str = "seed";

/// (category, unit type, product titles)
const CATALOG: &[(&str, UnitType, &[&str])] = &[
    (
        "bebidas",
        UnitType::Unit,
        &[
            "Agua Mineral 500ml",
            "Agua Mineral 2L",
            "Gaseosa Cola 1.5L",
            "Gaseosa Lima 1.5L",
            "Jugo de Naranja 1L",
            "Cerveza Rubia 473ml",
            "Vino Tinto 750ml",
            "Soda Sifón 2L",
        ],
    ),
    (
        "lácteos",
        UnitType::Unit,
        &[
            "Leche Entera 1L",
            "Leche Descremada 1L",
            "Yogur Natural",
            "Yogur Frutilla",
            "Manteca 200g",
            "Crema de Leche",
            "Dulce de Leche 400g",
        ],
    ),
    (
        "almacén",
        UnitType::Unit,
        &[
            "Arroz Largo Fino 1kg",
            "Fideos Spaghetti 500g",
            "Harina 000 1kg",
            "Azúcar 1kg",
            "Yerba Mate 1kg",
            "Café Molido 250g",
            "Aceite Girasol 1.5L",
            "Sal Fina 500g",
            "Galletitas Dulces",
            "Pan Lactal",
        ],
    ),
    (
        "fiambrería",
        UnitType::Weight,
        &["Jamón Cocido", "Queso Tybo", "Salame", "Mortadela", "Queso Rallado"],
    ),
    (
        "verdulería",
        UnitType::Weight,
        &["Papa", "Cebolla", "Tomate", "Banana", "Manzana", "Zanahoria"],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = usize::MAX;
    let mut db_path = String::from("./mercado_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mercado POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Maximum number of products (default: whole catalog)");
                println!("  -d, --db <PATH>    Database file path (default: ./mercado_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Mercado POS Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut generated = 0;
    let mut seeded: Vec<Product> = Vec::new();
    let start = std::time::Instant::now();

    'catalog: for (category_name, unit_type, titles) in CATALOG {
        let category = db.products().create_category(category_name).await?;

        for title in titles.iter() {
            if generated >= count {
                break 'catalog;
            }

            let new = generate_product(title, *unit_type, &category.id, generated);
            match db.products().create(new, OPERATOR).await {
                Ok(product) => seeded.push(product),
                Err(e) => {
                    warn!(title = %title, error = %e, "Failed to insert product");
                    continue;
                }
            }
            generated += 1;
        }
    }

    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    let promotions = seed_promotions(&db, &seeded).await?;
    println!("✓ Created {} promotions", promotions);

    let report = db.products().low_stock_report().await?;
    println!();
    println!("Low stock: {} of {} active products", report.low_stock_count, report.active_products);
    println!("✓ Seed complete!");

    Ok(())
}

/// Deterministic product data derived from its position in the catalog.
fn generate_product(title: &str, unit_type: UnitType, category_id: &str, seed: usize) -> NewProduct {
    let price = 350 + ((seed * 1733) % 9000) as i64;

    let current_stock = match unit_type {
        UnitType::Unit => (seed % 40) as f64,
        UnitType::Weight => ((seed * 37) % 250) as f64 / 10.0,
    };

    NewProduct {
        title: title.to_string(),
        price: Money::from_minor(price),
        current_stock,
        min_stock: 5.0,
        unit_type,
        category_id: Some(category_id.to_string()),
        barcode: Some(format!("779{:010}", seed)),
        cost_margin: Some(Money::from_minor(price * (20 + (seed % 15) as i64) / 100)),
    }
}

async fn seed_promotions(db: &Database, products: &[Product]) -> Result<usize, Box<dyn std::error::Error>> {
    let mut created = 0;

    db.promotions()
        .create(NewPromotion {
            name: "10% en compras grandes".to_string(),
            description: Some("Sobre compras de 15000 o más".to_string()),
            rule: PromotionRule::GeneralDiscount {
                min_purchase: Some(Money::from_minor(15000)),
            },
            discount: DiscountShape::Percentage(DiscountRate::from_percentage(10.0)?),
            window: ActivityWindow::default(),
            max_uses_per_day: None,
            priority: 1,
        })
        .await?;
    created += 1;

    let find = |title: &str| products.iter().find(|p| p.title == title);
    if let (Some(milk), Some(bread)) = (find("Leche Entera 1L"), find("Pan Lactal")) {
        db.promotions()
            .create(NewPromotion {
                name: "Desayuno".to_string(),
                description: None,
                rule: PromotionRule::Combo {
                    required: vec![
                        ComboRequirement {
                            product_id: milk.id.clone(),
                            min_quantity: 2.0,
                        },
                        ComboRequirement {
                            product_id: bread.id.clone(),
                            min_quantity: 1.0,
                        },
                    ],
                },
                discount: DiscountShape::FixedAmount(Money::from_minor(500)),
                window: ActivityWindow {
                    weekdays: vec![1, 2, 3, 4, 5],
                    ..ActivityWindow::default()
                },
                max_uses_per_day: Some(50),
                priority: 5,
            })
            .await?;
        created += 1;
    }

    Ok(created)
}
