//! # Stock Ledger
//!
//! Every change to a product's stock, in either direction, is one call to
//! [`apply_stock_delta`], which returns the ledger entry to persist alongside
//! the product.
//!
//! ## Ledger Shape
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ product: Gin 70cl                                                  │
//! │                                                                    │
//! │  #  reason    change  previous  new   actor                        │
//! │  1  initial     +10        0     10   manager-1                    │
//! │  2  restock      +5       10     15   manager-1   "Stock updated"  │
//! │  3  sale        -12       15      3   cashier-7   "ORD-..."        │
//! │                                                                    │
//! │  product.stock == last.new_stock == 3                              │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replaying the entries from zero reconstructs stock at any point in time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::product::Product;

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StockReason {
    /// Opening balance when the product is created.
    Initial,
    /// Goods received onto the shelf.
    Restock,
    /// Units leaving through checkout.
    Sale,
    /// Manual correction, either sign.
    Adjustment,
}

impl StockReason {
    /// Sign rule for the delta.
    fn check_delta(&self, delta: i64) -> Result<(), ValidationError> {
        let ok = match self {
            StockReason::Initial | StockReason::Restock => delta >= 0,
            StockReason::Sale => delta <= 0,
            StockReason::Adjustment => true,
        };
        if ok {
            Ok(())
        } else if delta < 0 {
            Err(ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            })
        } else {
            Err(ValidationError::InvalidFormat {
                field: "stock".to_string(),
                reason: "a sale can only remove stock".to_string(),
            })
        }
    }
}

/// One row of the stock ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockEntry {
    pub id: String,
    pub product_id: String,
    pub quantity_change: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: StockReason,
    pub note: Option<String>,
    /// User who caused the change, if any.
    pub actor_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Moves `product.stock` by `delta` and returns the matching ledger entry.
///
/// ## Errors
/// - `InsufficientStock` if the result would be negative. The product is left
///   untouched, there is no clamping.
/// - `Validation` if the sign of `delta` contradicts `reason`.
///
/// ## Example
/// ```rust
/// # use chrono::Utc;
/// # use tally_core::product::{Product, ProductCategory};
/// use tally_core::stock::{apply_stock_delta, StockReason};
/// # let now = Utc::now();
/// # let mut product = Product {
/// #     id: "p1".into(), name: "Gin".into(), description: None, price_cents: 2000,
/// #     barcode: "1".into(), category: ProductCategory::Spirits, stock: 10,
/// #     created_at: now, updated_at: now,
/// # };
///
/// let entry = apply_stock_delta(&mut product, 5, StockReason::Restock, None, Some("m1"), now).unwrap();
/// assert_eq!((entry.previous_stock, entry.new_stock), (10, 15));
/// assert!(apply_stock_delta(&mut product, -16, StockReason::Sale, None, None, now).is_err());
/// assert_eq!(product.stock, 15);
/// ```
pub fn apply_stock_delta(
    product: &mut Product,
    delta: i64,
    reason: StockReason,
    note: Option<String>,
    actor_id: Option<&str>,
    at: DateTime<Utc>,
) -> CoreResult<StockEntry> {
    reason.check_delta(delta)?;

    let previous_stock = product.stock;
    let new_stock = previous_stock
        .checked_add(delta)
        .filter(|s| *s >= 0)
        .ok_or_else(|| CoreError::InsufficientStock {
            product: product.name.clone(),
            available: previous_stock,
            requested: delta.saturating_neg(),
        })?;

    product.stock = new_stock;
    product.updated_at = at;

    Ok(StockEntry {
        id: Uuid::new_v4().to_string(),
        product_id: product.id.clone(),
        quantity_change: delta,
        previous_stock,
        new_stock,
        reason,
        note,
        actor_id: actor_id.map(str::to_string),
        created_at: at,
    })
}

/// Stock after replaying `entries` in order from zero.
pub fn replay(entries: &[StockEntry]) -> i64 {
    entries.iter().map(|e| e.quantity_change).sum()
}
