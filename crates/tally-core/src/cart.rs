//! # Cart Aggregate
//!
//! One cart per user. Lines are unique by product, the price is frozen when
//! the line is added, and `total_cents` is recomputed after every mutation.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Absent ──add_item──► Active (≥1 line) ──add/update/remove──► Active   │
//! │     ▲                        │      │                                   │
//! │     │                        │      └──remove last──► Empty (row kept)  │
//! │     │                        │                           │              │
//! │     └────── checkout / clear ┴───────────────────────────┘              │
//! │                                                                         │
//! │   Absent and Empty are observably the same: GET shows zero lines and   │
//! │   checkout fails with EmptyCart.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is checked here against the product the caller just loaded, and
//! again at checkout against live stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::product::Product;
use crate::validation::{amount_too_large, validate_quantity, ValidationResult};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartItem {
    pub product_id: String,

    /// Product name when the line was added.
    pub name: String,

    /// Price in cents when the line was added. Later price changes do not
    /// touch existing lines.
    pub unit_price_cents: i64,

    pub quantity: i64,

    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Builds a line from a product, freezing its name and price.
    pub fn from_product(product: &Product, quantity: i64, now: DateTime<Utc>) -> Self {
        CartItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            added_at: now,
        }
    }

    pub fn line_total(&self) -> ValidationResult<Money> {
        Money::from_cents(self.unit_price_cents)
            .checked_multiply_quantity(self.quantity)
            .ok_or_else(|| amount_too_large("lineTotal"))
    }
}

/// The user's cart.
///
/// ## Invariants
/// - Lines are unique by `product_id`
/// - Every line has `1 <= quantity <= 999`
/// - At most 100 lines
/// - `total_cents == Σ unit_price_cents × quantity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    pub id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// A fresh, empty cart for `user_id`.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Cart {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            items: Vec::new(),
            total_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds `quantity` of `product`, merging into an existing line. On error
    /// the cart is unchanged.
    ///
    /// ## Errors
    /// - `Validation` for a non-positive quantity
    /// - `QuantityTooLarge` if the merged line would exceed 999
    /// - `InsufficientStock` if the merged line exceeds `product.stock`
    /// - `CartTooLarge` when adding a 101st line
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        let existing = self.line(&product.id).map(|i| i.quantity).unwrap_or(0);
        let combined = existing + quantity;

        if combined > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: combined,
                max: MAX_ITEM_QUANTITY,
            });
        }
        ensure_in_stock(product, combined)?;

        let mut next = self.clone();
        match next.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(item) => item.quantity = combined,
            None => {
                if next.items.len() >= MAX_CART_ITEMS {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_ITEMS,
                    });
                }
                next.items.push(CartItem::from_product(product, quantity, now));
            }
        }

        next.touch(now)?;
        *self = next;
        Ok(())
    }

    /// Overwrites the quantity of an existing line.
    ///
    /// ## Errors
    /// - `NotFound` if the product has no line in this cart
    /// - `InsufficientStock` if `quantity` exceeds `product.stock`
    pub fn update_quantity(
        &mut self,
        product: &Product,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if self.line(&product.id).is_none() {
            return Err(CoreError::not_found("Cart item", &product.id));
        }
        ensure_in_stock(product, quantity)?;

        let mut next = self.clone();
        if let Some(item) = next.items.iter_mut().find(|i| i.product_id == product.id) {
            item.quantity = quantity;
        }
        next.touch(now)?;
        *self = next;
        Ok(())
    }

    /// Removes a line. The cart itself stays, possibly empty.
    pub fn remove_item(&mut self, product_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);

        if self.items.len() == before {
            return Err(CoreError::not_found("Cart item", product_id));
        }
        self.touch(now)?;
        Ok(())
    }

    pub fn line(&self, product_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn touch(&mut self, now: DateTime<Utc>) -> ValidationResult<()> {
        let total = self.items.iter().try_fold(Money::zero(), |total, item| {
            total
                .checked_add(item.line_total()?)
                .ok_or_else(|| amount_too_large("total"))
        })?;
        self.total_cents = total.cents();
        self.updated_at = now;
        Ok(())
    }
}

fn ensure_in_stock(product: &Product, wanted: i64) -> CoreResult<()> {
    if wanted > product.stock {
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.stock,
            requested: wanted,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductCategory;

    fn product(id: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            description: None,
            price_cents,
            barcode: format!("bc-{id}"),
            category: ProductCategory::Beer,
            stock,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_add_item_merges_lines() {
        let mut cart = Cart::new("u1", Utc::now());
        let beer = product("a", 299, 20);

        cart.add_item(&beer, 2, Utc::now()).unwrap();
        cart.add_item(&beer, 3, Utc::now()).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.total_cents, 1495);
    }

    #[test]
    fn test_add_item_checks_combined_quantity_against_stock() {
        let mut cart = Cart::new("u1", Utc::now());
        let beer = product("a", 299, 5);

        cart.add_item(&beer, 4, Utc::now()).unwrap();
        let err = cart.add_item(&beer, 2, Utc::now()).unwrap_err();

        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 5,
                requested: 6,
                ..
            }
        ));
        assert_eq!(cart.items[0].quantity, 4);
        assert_eq!(cart.total_cents, 4 * 299);
    }

    #[test]
    fn test_add_item_rejects_bad_quantities() {
        let mut cart = Cart::new("u1", Utc::now());
        let beer = product("a", 299, 5000);

        assert!(matches!(
            cart.add_item(&beer, 0, Utc::now()),
            Err(CoreError::Validation(_))
        ));
        cart.add_item(&beer, 900, Utc::now()).unwrap();
        assert!(matches!(
            cart.add_item(&beer, 100, Utc::now()),
            Err(CoreError::QuantityTooLarge { requested: 1000, .. })
        ));
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new("u1", Utc::now());
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(&product(&i.to_string(), 100, 1), 1, Utc::now())
                .unwrap();
        }
        assert!(matches!(
            cart.add_item(&product("extra", 100, 1), 1, Utc::now()),
            Err(CoreError::CartTooLarge { .. })
        ));
    }

    #[test]
    fn test_price_is_frozen_at_add_time() {
        let mut cart = Cart::new("u1", Utc::now());
        let mut wine = product("w", 1200, 10);
        cart.add_item(&wine, 1, Utc::now()).unwrap();

        wine.price_cents = 1500;
        cart.add_item(&wine, 1, Utc::now()).unwrap();

        assert_eq!(cart.items[0].unit_price_cents, 1200);
        assert_eq!(cart.total_cents, 2400);
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = Cart::new("u1", Utc::now());
        let soda = product("s", 100, 8);
        cart.add_item(&soda, 1, Utc::now()).unwrap();

        cart.update_quantity(&soda, 8, Utc::now()).unwrap();
        assert_eq!(cart.total_cents, 800);

        assert!(matches!(
            cart.update_quantity(&soda, 9, Utc::now()),
            Err(CoreError::InsufficientStock { .. })
        ));
        assert!(matches!(
            cart.update_quantity(&product("other", 100, 8), 1, Utc::now()),
            Err(CoreError::NotFound { .. })
        ));
        assert_eq!(cart.items[0].quantity, 8);
    }

    #[test]
    fn test_overflowing_line_total_leaves_cart_unchanged() {
        let mut cart = Cart::new("u1", Utc::now());
        let beer = product("a", 299, 10);
        cart.add_item(&beer, 1, Utc::now()).unwrap();

        let vintage = product("v", i64::MAX / 2 + 1, 10);
        let err = cart.add_item(&vintage, 2, Utc::now()).unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total_cents, 299);
    }

    #[test]
    fn test_remove_last_item_keeps_empty_cart() {
        let mut cart = Cart::new("u1", Utc::now());
        let juice = product("j", 350, 3);
        cart.add_item(&juice, 2, Utc::now()).unwrap();

        cart.remove_item("j", Utc::now()).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_cents, 0);

        assert!(matches!(
            cart.remove_item("j", Utc::now()),
            Err(CoreError::NotFound { .. })
        ));
    }
}
