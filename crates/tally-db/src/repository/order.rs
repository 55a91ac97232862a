//! # Order Repository
//!
//! Orders are only ever inserted by checkout (see
//! [`CartRepository::checkout`](crate::repository::cart::CartRepository::checkout)).
//! After that the only write is a status change.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tally_core::order::SalesSummary;
use tally_core::{Order, OrderItem, OrderStatus, Page, PageRequest, PaymentMethod};

use crate::error::{DbError, DbResult};

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: String,
    order_number: String,
    user_id: String,
    total_cents: i64,
    status: OrderStatus,
    payment_method: PaymentMethod,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) const ORDER_COLUMNS: &str =
    "id, order_number, user_id, total_cents, status, payment_method, created_at, updated_at";

/// Admin list filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// ## Errors
    /// `NotFound` if no order has this id.
    pub async fn get(&self, id: &str) -> DbResult<Order> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    /// The user's own orders, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        with_items(&mut conn, rows).await
    }

    /// All orders, newest first, for administrators.
    pub async fn list(&self, filter: &OrderFilter, request: PageRequest) -> DbResult<Page<Order>> {
        const WHERE: &str = "WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR user_id = ?2)";

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders {WHERE} ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(filter.status)
        .bind(&filter.user_id)
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {WHERE}"))
            .bind(filter.status)
            .bind(&filter.user_id)
            .fetch_one(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        let orders = with_items(&mut conn, rows).await?;
        Ok(Page::new(orders, total, request))
    }

    /// Moves an order along its status table.
    ///
    /// ## Errors
    /// - `NotFound` if the order is absent
    /// - `InvalidTransition` unless it is pending → completed/cancelled
    pub async fn update_status(&self, id: &str, status: OrderStatus) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        let from = order.status;
        order.update_status(status, Utc::now())?;

        sqlx::query("UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4")
            .bind(&order.id)
            .bind(order.status)
            .bind(order.updated_at)
            .bind(from)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(order_id = %id, from = %from, to = %order.status, "Order status changed");
        Ok(order)
    }

    /// Non-cancelled orders created in `[from, to]`.
    pub async fn sales_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<SalesSummary> {
        debug!(from = %from, to = %to, "Computing sales summary");

        let summary = sqlx::query_as::<_, SalesSummary>(
            r#"
            SELECT
                COUNT(*) AS order_count,
                COALESCE(SUM(o.total_cents), 0) AS revenue_cents,
                COALESCE(SUM(
                    (SELECT SUM(i.quantity) FROM order_items i WHERE i.order_id = o.id)
                ), 0) AS items_sold
            FROM orders o
            WHERE o.status != 'cancelled'
              AND o.created_at >= ?1 AND o.created_at <= ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }
}

pub(crate) async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, user_id, total_cents, status, payment_method,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(order.total_cents)
    .bind(order.status)
    .bind(order.payment_method)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                order_id, position, product_id, name, quantity, price_cents, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&order.id)
        .bind(position as i64)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.price_cents)
        .bind(item.line_total_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_items(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

pub(crate) async fn with_items(conn: &mut SqliteConnection, rows: Vec<OrderRow>) -> DbResult<Vec<Order>> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT product_id, name, quantity, price_cents, line_total_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await?;

        orders.push(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            items,
            total_cents: row.total_cents,
            status: row.status,
            payment_method: row.payment_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }
    Ok(orders)
}
