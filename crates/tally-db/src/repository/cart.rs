//! # Cart Repository
//!
//! Persists the per-user [`Cart`] aggregate and runs checkout.
//!
//! Every mutation loads the whole cart, applies the `tally-core` method and
//! writes the whole cart back, all in one transaction.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                 │
//! │    load cart                        absent / empty → EmptyCart         │
//! │    load live product for each line                                     │
//! │    place_order(cart, live, ..)      first short line → InsufficientStock│
//! │    for each line: UPDATE stock (compare-and-set) + INSERT sale entry   │
//! │    INSERT order + order_items                                          │
//! │    DELETE cart                                                         │
//! │  COMMIT                             any error above → ROLLBACK         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use tally_core::order::place_order;
use tally_core::{Cart, CartItem, CoreError, Order, PaymentMethod};

use crate::error::{DbError, DbResult};
use crate::repository::order::insert_order;
use crate::repository::product::{fetch_product, save_stock_change};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: String,
    user_id: String,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// The user's cart. An absent cart is returned as a fresh empty one
    /// (not persisted).
    pub async fn get(&self, user_id: &str) -> DbResult<Cart> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_cart(&mut conn, user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, Utc::now())))
    }

    /// Adds `quantity` of a product, creating the cart on first use.
    ///
    /// ## Errors
    /// - `NotFound` if the product doesn't exist
    /// - `InsufficientStock`, `QuantityTooLarge`, `CartTooLarge`, `Validation`
    pub async fn add_item(&self, user_id: &str, product_id: &str, quantity: i64) -> DbResult<Cart> {
        debug!(user_id = %user_id, product_id = %product_id, quantity, "Adding to cart");
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let product = fetch_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        let mut cart = load_cart(&mut tx, user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id, now));
        cart.add_item(&product, quantity, now)?;

        save_cart(&mut tx, &cart).await?;
        tx.commit().await?;

        debug!(cart_id = %cart.id, total_cents = cart.total_cents, "Cart updated");
        Ok(cart)
    }

    /// Overwrites the quantity of a line.
    ///
    /// ## Errors
    /// - `NotFound` if the line (or its product) doesn't exist
    /// - `InsufficientStock` if `quantity` exceeds current stock
    pub async fn update_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<Cart> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Cart item", product_id))?;
        let product = fetch_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        cart.update_quantity(&product, quantity, now)?;

        save_cart(&mut tx, &cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Removes a line. Removing the last line leaves an empty cart.
    pub async fn remove_item(&self, user_id: &str, product_id: &str) -> DbResult<Cart> {
        let mut tx = self.pool.begin().await?;

        let mut cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Cart item", product_id))?;
        cart.remove_item(product_id, Utc::now())?;

        save_cart(&mut tx, &cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Deletes the cart entirely. Clearing an absent cart is not an error.
    pub async fn clear(&self, user_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM carts WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        debug!(user_id = %user_id, removed = result.rows_affected(), "Cart cleared");
        Ok(())
    }

    /// Turns the cart into an order against live stock, all or nothing.
    ///
    /// ## Errors
    /// - `EmptyCart` if the cart is absent or has no lines
    /// - `InsufficientStock` naming the first line that can't be fulfilled
    /// - `NotFound` if a line's product was deleted
    /// - `TransactionFailed` if stock moved concurrently
    pub async fn checkout(&self, user_id: &str, payment_method: PaymentMethod) -> DbResult<Order> {
        debug!(user_id = %user_id, payment_method = ?payment_method, "Starting checkout");
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(CoreError::EmptyCart)?;

        let mut live = HashMap::with_capacity(cart.items.len());
        for line in &cart.items {
            if let Some(product) = fetch_product(&mut tx, &line.product_id).await? {
                live.insert(product.id.clone(), product);
            }
        }

        let placed = place_order(&cart, &live, payment_method, now).map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Checkout rejected");
            e
        })?;

        for (product, entry) in placed.products.iter().zip(&placed.ledger) {
            save_stock_change(&mut tx, product, entry.previous_stock, entry).await?;
        }
        insert_order(&mut tx, &placed.order).await?;

        sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(&cart.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            order_id = %placed.order.id,
            order_number = %placed.order.order_number,
            total_cents = placed.order.total_cents,
            lines = placed.order.items.len(),
            "Checkout committed"
        );
        Ok(placed.order)
    }
}

async fn load_cart(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Option<Cart>> {
    let Some(row) = sqlx::query_as::<_, CartRow>(
        "SELECT id, user_id, total_cents, created_at, updated_at FROM carts WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, CartItem>(
        r#"
        SELECT product_id, name, unit_price_cents, quantity, added_at
        FROM cart_items
        WHERE cart_id = ?1
        ORDER BY position
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Cart {
        id: row.id,
        user_id: row.user_id,
        items,
        total_cents: row.total_cents,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

/// Upserts the cart row and rewrites its lines in order.
async fn save_cart(conn: &mut SqliteConnection, cart: &Cart) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO carts (id, user_id, total_cents, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (id) DO UPDATE SET
            total_cents = excluded.total_cents,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&cart.id)
    .bind(&cart.user_id)
    .bind(cart.total_cents)
    .bind(cart.created_at)
    .bind(cart.updated_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
        .bind(&cart.id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in cart.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cart_items (
                cart_id, position, product_id, name, unit_price_cents, quantity, added_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&cart.id)
        .bind(position as i64)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.added_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use tally_core::{OrderStatus, Role, StockReason};

    #[tokio::test]
    async fn test_absent_cart_reads_as_empty() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "a@example.com", Role::User).await;

        let cart = db.carts().get(&user.id).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_cents, 0);

        db.carts().clear(&user.id).await.unwrap();
        assert!(matches!(
            db.carts().checkout(&user.id, PaymentMethod::Cash).await,
            Err(DbError::Domain(CoreError::EmptyCart))
        ));
    }

    #[tokio::test]
    async fn test_restock_add_and_checkout_scenario() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "b@example.com", Role::User).await;
        let product = fixtures::product(&db, "Product A", 450, 10).await;

        let restocked = db.products().restock(&product.id, 5, None, Some(&user.id)).await.unwrap();
        assert_eq!(restocked.stock, 15);
        assert_eq!(db.products().history(&product.id).await.unwrap().len(), 2);

        let cart = db.carts().add_item(&user.id, &product.id, 12).await.unwrap();
        assert_eq!(cart.total_cents, 12 * 450);

        let order = db.carts().checkout(&user.id, PaymentMethod::Card).await.unwrap();
        assert_eq!(order.total_cents, 12 * 450);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(db.products().get(&product.id).await.unwrap().stock, 3);

        let history = db.products().history(&product.id).await.unwrap();
        assert_eq!(history[0].reason, StockReason::Sale);
        assert_eq!(history[0].quantity_change, -12);
        assert_eq!(history[0].note.as_deref(), Some(order.order_number.as_str()));

        let cart_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(cart_rows, 0);
        assert_eq!(db.orders().get(&order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_checkout_is_all_or_nothing() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "c@example.com", Role::User).await;
        let plenty = fixtures::product(&db, "Tonic", 150, 50).await;
        let scarce = fixtures::product(&db, "Bitters", 900, 4).await;

        db.carts().add_item(&user.id, &plenty.id, 10).await.unwrap();
        db.carts().add_item(&user.id, &scarce.id, 4).await.unwrap();

        // Live stock drops below the cart line after it was added.
        db.products()
            .apply_delta(&scarce.id, -2, StockReason::Adjustment, None, None)
            .await
            .unwrap();

        let err = db.carts().checkout(&user.id, PaymentMethod::Cash).await.unwrap_err();
        match err {
            DbError::Domain(CoreError::InsufficientStock { product, .. }) => {
                assert_eq!(product, "Bitters")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(db.products().get(&plenty.id).await.unwrap().stock, 50);
        assert_eq!(db.products().get(&scarce.id).await.unwrap().stock, 2);
        assert_eq!(db.carts().get(&user.id).await.unwrap().items.len(), 2);
        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orders, 0);
    }

    #[tokio::test]
    async fn test_checkout_rolls_back_written_lines() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "e@example.com", Role::User).await;
        let first = fixtures::product(&db, "Soda", 120, 30).await;
        let second = fixtures::product(&db, "Ginger Ale", 180, 30).await;

        db.carts().add_item(&user.id, &first.id, 5).await.unwrap();
        db.carts().add_item(&user.id, &second.id, 3).await.unwrap();

        // The second line's stock write matches no row, as if another writer
        // had moved its stock after it was read.
        sqlx::query(&format!(
            "CREATE TRIGGER skip_second BEFORE UPDATE OF stock ON products \
             WHEN OLD.id = '{}' BEGIN SELECT RAISE(IGNORE); END",
            second.id
        ))
        .execute(db.pool())
        .await
        .unwrap();

        let entries = |product_id: String| {
            let pool = db.pool().clone();
            async move {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM stock_entries WHERE product_id = ?1",
                )
                .bind(product_id)
                .fetch_one(&pool)
                .await
                .unwrap()
            }
        };
        let first_entries = entries(first.id.clone()).await;

        let err = db.carts().checkout(&user.id, PaymentMethod::Cash).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)), "{err:?}");

        assert_eq!(db.products().get(&first.id).await.unwrap().stock, 30);
        assert_eq!(entries(first.id.clone()).await, first_entries);
        assert_eq!(db.carts().get(&user.id).await.unwrap().items.len(), 2);
        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orders, 0);
    }

    #[tokio::test]
    async fn test_line_mutations() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "d@example.com", Role::User).await;
        let wine = fixtures::product(&db, "Rioja", 1200, 6).await;
        let beer = fixtures::product(&db, "Lager", 300, 24).await;

        db.carts().add_item(&user.id, &wine.id, 1).await.unwrap();
        db.carts().add_item(&user.id, &beer.id, 6).await.unwrap();
        let cart = db.carts().add_item(&user.id, &wine.id, 2).await.unwrap();
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 3);

        let err = db.carts().add_item(&user.id, &wine.id, 4).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { .. })));

        let cart = db.carts().update_quantity(&user.id, &beer.id, 12).await.unwrap();
        assert_eq!(cart.total_cents, 3 * 1200 + 12 * 300);
        assert!(db.carts().update_quantity(&user.id, &beer.id, 25).await.is_err());

        db.carts().remove_item(&user.id, &wine.id).await.unwrap();
        let cart = db.carts().remove_item(&user.id, &beer.id).await.unwrap();
        assert!(cart.is_empty());
        assert!(db.carts().get(&user.id).await.unwrap().is_empty());
        assert!(matches!(
            db.carts().remove_item(&user.id, &beer.id).await,
            Err(DbError::Domain(CoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_product_in_cart_cannot_be_deleted() {
        let db = fixtures::db().await;
        let user = fixtures::user(&db, "e@example.com", Role::User).await;
        let product = fixtures::product(&db, "Cola", 199, 5).await;
        db.carts().add_item(&user.id, &product.id, 1).await.unwrap();

        assert!(matches!(
            db.products().delete(&product.id).await,
            Err(DbError::Domain(CoreError::InvalidState { .. }))
        ));

        db.carts().clear(&user.id).await.unwrap();
        db.products().delete(&product.id).await.unwrap();
    }
}
