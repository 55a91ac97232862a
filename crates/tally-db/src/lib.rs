//! # tally-db: Database Layer for Tally
//!
//! This crate provides persistence for the Tally back office.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  axum handler (POST /orders)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ CartRepo      │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo     │    │   _schema    │  │   │
//! │  │   │ Transactions  │    │ PurchaseRepo  │    │              │  │   │
//! │  │   │               │    │ ...           │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ load → tally-core rule → save  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories never decide business rules themselves. They load the
//! aggregate inside a transaction, hand it to the matching `tally-core`
//! function, and write back whatever that function returned.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("sqlite://./tally.db")).await?;
//! let order = db.carts().checkout(&user_id, PaymentMethod::Cash).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::dashboard::{DashboardRepository, RecentTransaction};
pub use repository::order::{OrderFilter, OrderRepository};
pub use repository::product::{ProductFilter, ProductRepository};
pub use repository::purchase::{BulkFailure, BulkUpdateResult, PurchaseFilter, PurchaseList, PurchaseRepository};
pub use repository::report::ReportRepository;
pub use repository::user::{UserRecord, UserRepository, UserUpdate};
pub use repository::vendor::{VendorDetail, VendorFilter, VendorRepository};
