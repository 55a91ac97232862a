//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  axum handler                                                          │
//! │       │  db.carts().add_item(user_id, product_id, 2)                   │
//! │       ▼                                                                 │
//! │  CartRepository                                                        │
//! │  ├── begin transaction                                                 │
//! │  ├── load Cart + Product rows                                          │
//! │  ├── Cart::add_item(..)          ← tally-core decides                  │
//! │  ├── write Cart rows back                                              │
//! │  └── commit                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`UserRepository`](user::UserRepository) - Accounts and credentials
//! - [`ProductRepository`](product::ProductRepository) - Catalogue and stock ledger
//! - [`CartRepository`](cart::CartRepository) - Carts and checkout
//! - [`OrderRepository`](order::OrderRepository) - Order history and status
//! - [`VendorRepository`](vendor::VendorRepository) - Suppliers and their stats
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Purchase orders
//! - [`ReportRepository`](report::ReportRepository) - Financial aggregations
//! - [`DashboardRepository`](dashboard::DashboardRepository) - Admin overview figures

pub mod cart;
pub mod dashboard;
pub mod order;
pub mod product;
pub mod purchase;
pub mod report;
pub mod user;
pub mod vendor;

/// `%term%` for a case-insensitive `LIKE`, with the wildcards in `term`
/// escaped (queries use `ESCAPE '\'`).
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}
