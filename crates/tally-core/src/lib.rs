//! # tally-core: Pure Business Logic for Tally
//!
//! This crate holds every business rule of the back office as pure functions
//! and plain data. Nothing in here touches a database, a socket or a clock
//! it was not handed.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Frontend (React SPA)                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON over HTTP                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tally-api (axum handlers)                       │   │
//! │  │       session guard ──► authorize ──► repository call           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  permission  stock   cart   order   purchase   vendor  report   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │        SQLite queries, migrations, transactional repositories   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`permission`] - Role → permission table and the authorization check
//! - [`user`] - User identity, roles and departments
//! - [`product`] / [`stock`] - Products and the append-only stock ledger
//! - [`cart`] - The per-user cart aggregate
//! - [`order`] - Order snapshots and the order status table
//! - [`purchase`] - Purchase orders and their approval lifecycle
//! - [`vendor`] - Suppliers and their purchase statistics
//! - [`report`] - Profit & loss and cash-flow arithmetic
//! - [`dashboard`] - Admin overview figures and the seven-day sales series
//! - [`money`] - Integer money (cents)
//! - [`page`] - Pagination of list results
//! - [`error`] / [`validation`] - Domain errors and input rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output, time is passed in
//! 2. **Integer Money**: all monetary values are in cents (i64)
//! 3. **Explicit Errors**: all errors are typed, never strings or panics
//! 4. **Derived, not stored**: permissions come from the role, vendor stats come
//!    from purchases

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod dashboard;
pub mod error;
pub mod money;
pub mod order;
pub mod page;
pub mod permission;
pub mod product;
pub mod purchase;
pub mod report;
pub mod stock;
pub mod user;
pub mod validation;
pub mod vendor;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use order::{Order, OrderItem, OrderStatus, PaymentMethod};
pub use page::{Page, PageRequest};
pub use permission::{authorize, AccessPolicy, Permission, PermissionTable};
pub use product::{Product, ProductCategory};
pub use purchase::{
    PaymentStatus, PaymentTerms, Purchase, PurchaseCategory, PurchaseItem, PurchaseStatus,
};
pub use stock::{apply_stock_delta, StockEntry, StockReason};
pub use user::{Department, Role, User};
pub use vendor::{Address, Vendor, VendorStats, VendorStatus};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line in a cart.
///
/// ## Business Reason
/// Catches fat-finger entries (1000 instead of 10) before they reach checkout.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest accepted unit price, in cents ($100,000,000.00).
///
/// With quantities capped at MAX_ITEM_QUANTITY, line totals and cart totals
/// stay far inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on page size for list endpoints.
pub const MAX_PAGE_SIZE: i64 = 100;
