//! # Demo Data Seeder
//!
//! Fills a database with a bar catalogue and a handful of vendors for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db
//! cargo run -p tally-db --bin seed
//!
//! # Seed another database file
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//!
//! # Only the first 10 products
//! cargo run -p tally-db --bin seed -- --count 10
//! ```
//!
//! Products get an `initial` stock ledger entry, like any product created
//! through the API. The seeder refuses to run on a database that already has
//! products.

use std::env;

use tally_core::product::NewProduct;
use tally_core::vendor::VendorInput;
use tally_core::{Address, PaymentTerms, ProductCategory, PurchaseCategory, VendorStatus};
use tally_db::{Database, DbConfig};

/// (name, category, price in cents, opening stock)
const CATALOGUE: &[(&str, ProductCategory, i64, i64)] = &[
    ("London Dry Gin 70cl", ProductCategory::Spirits, 2899, 24),
    ("Navy Strength Gin 70cl", ProductCategory::Spirits, 3899, 12),
    ("Blended Scotch 70cl", ProductCategory::Spirits, 2499, 18),
    ("Single Malt 12yo 70cl", ProductCategory::Spirits, 4999, 6),
    ("White Rum 70cl", ProductCategory::Spirits, 1999, 20),
    ("Reposado Tequila 70cl", ProductCategory::Spirits, 3499, 8),
    ("House Red 75cl", ProductCategory::Wine, 1250, 36),
    ("House White 75cl", ProductCategory::Wine, 1250, 36),
    ("Prosecco 75cl", ProductCategory::Wine, 1599, 24),
    ("Pale Ale 33cl", ProductCategory::Beer, 349, 96),
    ("Lager 33cl", ProductCategory::Beer, 299, 120),
    ("Stout 44cl", ProductCategory::Beer, 399, 48),
    ("Tonic Water 20cl", ProductCategory::Mixers, 149, 144),
    ("Ginger Beer 20cl", ProductCategory::Mixers, 169, 96),
    ("Soda Water 20cl", ProductCategory::Mixers, 99, 144),
    ("Aromatic Bitters 20cl", ProductCategory::Bitters, 1199, 10),
    ("Orange Bitters 10cl", ProductCategory::Bitters, 899, 10),
    ("Energy Drink 25cl", ProductCategory::EnergyDrink, 249, 72),
    ("Whole Milk 1L", ProductCategory::Milk, 129, 12),
    ("Cola 33cl", ProductCategory::Soda, 149, 96),
    ("Lemonade 33cl", ProductCategory::Soda, 149, 96),
    ("Orange Juice 1L", ProductCategory::Juice, 299, 24),
    ("Cranberry Juice 1L", ProductCategory::Juice, 319, 18),
    ("Bar Snacks Mix", ProductCategory::Other, 199, 40),
];

/// (name, email, payment terms, categories)
const VENDORS: &[(&str, &str, PaymentTerms, &[PurchaseCategory])] = &[
    (
        "Coastal Spirits",
        "orders@coastal-spirits.example",
        PaymentTerms::Net30,
        &[PurchaseCategory::Materials],
    ),
    (
        "Harbour Glass",
        "sales@harbour-glass.example",
        PaymentTerms::Net15,
        &[PurchaseCategory::Materials, PurchaseCategory::Other],
    ),
    (
        "Northside Property",
        "rent@northside.example",
        PaymentTerms::DueOnReceipt,
        &[PurchaseCategory::Rent],
    ),
    (
        "Bright Power & Water",
        "billing@bright-utilities.example",
        PaymentTerms::Net60,
        &[PurchaseCategory::Utilities],
    ),
    (
        "Poster Lab",
        "hello@posterlab.example",
        PaymentTerms::Cod,
        &[PurchaseCategory::Marketing],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count = CATALOGUE.len();
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(CATALOGUE.len());
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
                println!("Tally Demo Data Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!(
                    "  -c, --count <N>    Number of products to create (default: {})",
                    CATALOGUE.len()
                );
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally Demo Data Seeder");
    println!("=========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Creating products...");
    let mut created = 0;
    for (index, (name, category, price_cents, stock)) in
        CATALOGUE.iter().take(count).enumerate()
    {
        let input = NewProduct {
            name: name.to_string(),
            description: None,
            price_cents: *price_cents,
            // EAN-13 shaped, checksum not valid
            barcode: format!("590{:010}", index + 1),
            category: *category,
            stock: *stock,
        };
        match db.products().create(&input, None).await {
            Ok(_) => created += 1,
            Err(e) => eprintln!("Failed to create {}: {}", name, e),
        }
    }
    println!("✓ Created {} products", created);

    println!();
    println!("Creating vendors...");
    let mut vendors = 0;
    for (name, email, payment_terms, categories) in VENDORS {
        let input = VendorInput {
            name: name.to_string(),
            company_name: None,
            email: email.to_string(),
            phone: None,
            address: Address::default(),
            tax_id: None,
            payment_terms: *payment_terms,
            categories: categories.to_vec(),
            status: VendorStatus::Active,
            rating: None,
            notes: None,
        };
        match db.vendors().create(&input, "seed").await {
            Ok(_) => vendors += 1,
            Err(e) => eprintln!("Failed to create vendor {}: {}", name, e),
        }
    }
    println!("✓ Created {} vendors", vendors);

    println!();
    println!("✓ Seed complete!");
    db.close().await;

    Ok(())
}
