//! # Orders
//!
//! An order is an immutable snapshot of a cart taken at checkout. After
//! creation only its status moves, and only along the table below.
//!
//! ## Status Table
//! ```text
//!            ┌───────────► completed (terminal)
//!   pending ─┤
//!            └───────────► cancelled (terminal)
//! ```
//!
//! ## Checkout
//! [`place_order`] takes the cart and the *live* products (freshly read inside
//! the caller's transaction) and either returns the order plus one `sale`
//! ledger entry per line, or fails without having produced anything the
//! caller could persist.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult};
use crate::product::Product;
use crate::stock::{apply_stock_delta, StockEntry, StockReason};

// =============================================================================
// Status & Payment
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Only `pending → completed` and `pending → cancelled` are allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Charged to a hotel room folio.
    RoomCharge,
}

// =============================================================================
// Order
// =============================================================================

/// A line of an order. Name and price are copies, never re-read from the
/// product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-readable number, e.g. `ORD-20260114-3F2A9C1B`.
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Moves the order along the status table.
    ///
    /// ## Errors
    /// `InvalidTransition` for anything other than leaving `pending`.
    pub fn update_status(&mut self, next: OrderStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                entity: "order",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Total units across all lines.
    pub fn items_sold(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Result of a successful checkout: what to write, in one transaction.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// Products with their stock already decremented.
    pub products: Vec<Product>,
    pub ledger: Vec<StockEntry>,
}

/// Converts a cart into an order against live stock.
///
/// Lines are processed in cart order and the first line that cannot be
/// fulfilled aborts the checkout, naming that product. `live` is not modified
/// on failure.
///
/// ## Errors
/// - `EmptyCart` if the cart has no lines
/// - `NotFound` if a line's product is missing from `live`
/// - `InsufficientStock` if a line exceeds live stock
pub fn place_order(
    cart: &Cart,
    live: &HashMap<String, Product>,
    payment_method: PaymentMethod,
    now: DateTime<Utc>,
) -> CoreResult<PlacedOrder> {
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    let order_id = Uuid::new_v4().to_string();
    let order_number = order_number(&order_id, now);

    let mut products = Vec::with_capacity(cart.items.len());
    let mut ledger = Vec::with_capacity(cart.items.len());
    let mut items = Vec::with_capacity(cart.items.len());

    for line in &cart.items {
        let mut product = live
            .get(&line.product_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Product", &line.product_id))?;

        let entry = apply_stock_delta(
            &mut product,
            -line.quantity,
            StockReason::Sale,
            Some(order_number.clone()),
            Some(&cart.user_id),
            now,
        )?;

        items.push(OrderItem {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            price_cents: line.unit_price_cents,
            line_total_cents: line.line_total()?.cents(),
        });
        products.push(product);
        ledger.push(entry);
    }

    let order = Order {
        id: order_id,
        order_number,
        user_id: cart.user_id.clone(),
        items,
        total_cents: cart.total_cents,
        status: OrderStatus::Pending,
        payment_method,
        created_at: now,
        updated_at: now,
    };

    Ok(PlacedOrder {
        order,
        products,
        ledger,
    })
}

fn order_number(order_id: &str, now: DateTime<Utc>) -> String {
    let suffix: String = order_id
        .chars()
        .filter(|c| *c != '-')
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Sales totals over a time window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SalesSummary {
    pub order_count: i64,
    pub revenue_cents: i64,
    pub items_sold: i64,
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
            category: ProductCategory::Wine,
            stock,
            created_at: now,
            updated_at: now,
        }
    }

    fn cart_with(lines: &[(&Product, i64)]) -> Cart {
        let mut cart = Cart::new("u1", Utc::now());
        for (p, qty) in lines {
            cart.add_item(p, *qty, Utc::now()).unwrap();
        }
        cart
    }

    #[test]
    fn test_order_status_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn test_payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::RoomCharge).unwrap(),
            "\"room-charge\""
        );
    }

    #[test]
    fn test_place_order_snapshots_cart_and_decrements_stock() {
        let a = product("a", 1000, 15);
        let b = product("b", 250, 4);
        let cart = cart_with(&[(&a, 12), (&b, 4)]);
        let live = HashMap::from([("a".to_string(), a.clone()), ("b".to_string(), b.clone())]);

        let placed = place_order(&cart, &live, PaymentMethod::Cash, Utc::now()).unwrap();

        assert_eq!(placed.order.total_cents, 12 * 1000 + 4 * 250);
        assert_eq!(placed.order.total_cents, cart.total_cents);
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.items_sold(), 16);
        assert!(placed.order.order_number.starts_with("ORD-"));

        let stocks: Vec<i64> = placed.products.iter().map(|p| p.stock).collect();
        assert_eq!(stocks, vec![3, 0]);
        assert!(placed.ledger.iter().all(|e| e.reason == StockReason::Sale));
        assert_eq!(placed.ledger[0].quantity_change, -12);
    }

    #[test]
    fn test_place_order_rechecks_live_stock() {
        let a = product("a", 1000, 15);
        let b = product("b", 250, 4);
        let cart = cart_with(&[(&a, 2), (&b, 4)]);

        // Someone bought two units of b since it was added.
        let live = HashMap::from([("a".to_string(), a), ("b".to_string(), product("b", 250, 2))]);

        let err = place_order(&cart, &live, PaymentMethod::Card, Utc::now()).unwrap_err();
        match err {
            CoreError::InsufficientStock { product, .. } => assert_eq!(product, "Product b"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(live["a"].stock, 15);
    }

    #[test]
    fn test_place_order_empty_cart() {
        let cart = Cart::new("u1", Utc::now());
        assert!(matches!(
            place_order(&cart, &HashMap::new(), PaymentMethod::Cash, Utc::now()),
            Err(CoreError::EmptyCart)
        ));
    }

    #[test]
    fn test_update_status_rejects_terminal_moves() {
        let a = product("a", 500, 1);
        let cart = cart_with(&[(&a, 1)]);
        let live = HashMap::from([("a".to_string(), a)]);
        let mut order = place_order(&cart, &live, PaymentMethod::Cash, Utc::now())
            .unwrap()
            .order;

        order.update_status(OrderStatus::Completed, Utc::now()).unwrap();
        assert!(matches!(
            order.update_status(OrderStatus::Cancelled, Utc::now()),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(order.status, OrderStatus::Completed);
    }
}
