//! # Dashboard Repository
//!
//! Read-only aggregations over orders and products for the admin landing
//! page. Revenue counts completed orders only; best sellers, category sales
//! and the daily series skip cancelled orders.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use tally_core::dashboard::{
    daily_series, CategorySales, DailySales, DashboardClock, DashboardOverview,
    DashboardProducts, LowStockProduct, OrderCounts, RevenueSummary, TopSeller,
    LOW_STOCK_THRESHOLD, RECENT_TRANSACTIONS, TOP_SELLERS,
};
use tally_core::Order;

use crate::error::{DbError, DbResult};
use crate::repository::order::{with_items, OrderRow, ORDER_COLUMNS};

/// An order with the name and email of the user who placed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTransaction {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(sqlx::FromRow)]
struct Customer {
    order_id: String,
    customer_name: String,
    customer_email: String,
}

#[derive(sqlx::FromRow)]
struct DailyRow {
    day: String,
    revenue_cents: i64,
    orders: i64,
}

#[derive(Debug, Clone)]
pub struct DashboardRepository {
    pool: SqlitePool,
}

impl DashboardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DashboardRepository { pool }
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> DbResult<DashboardOverview> {
        let clock = DashboardClock::at(now);
        debug!(month_start = %clock.month_start, day_start = %clock.day_start, "Computing dashboard overview");

        let revenue = RevenueSummary {
            total_cents: self.completed_revenue(DateTime::UNIX_EPOCH).await?,
            monthly_cents: self.completed_revenue(clock.month_start).await?,
            daily_cents: self.completed_revenue(clock.day_start).await?,
        };

        let (total, pending): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(status = 'pending'), 0) FROM orders",
        )
        .fetch_one(&self.pool)
        .await?;

        let low_stock = sqlx::query_as::<_, LowStockProduct>(
            "SELECT id, name, stock, category FROM products WHERE stock < ?1 ORDER BY stock, name",
        )
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_all(&self.pool)
        .await?;

        let top_selling = sqlx::query_as::<_, TopSeller>(
            r#"
            SELECT i.product_id AS product_id,
                   MIN(i.name) AS name,
                   SUM(i.quantity) AS total_sold,
                   SUM(i.line_total_cents) AS revenue_cents
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE o.status != 'cancelled'
            GROUP BY i.product_id
            ORDER BY total_sold DESC, revenue_cents DESC
            LIMIT ?1
            "#,
        )
        .bind(TOP_SELLERS)
        .fetch_all(&self.pool)
        .await?;

        // Lines whose product has since been deleted have no category.
        let sales_by_category = sqlx::query_as::<_, CategorySales>(
            r#"
            SELECT p.category AS category,
                   SUM(i.quantity) AS total_sold,
                   SUM(i.line_total_cents) AS revenue_cents
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            JOIN products p ON p.id = i.product_id
            WHERE o.status != 'cancelled'
            GROUP BY p.category
            ORDER BY revenue_cents DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardOverview {
            revenue,
            orders: OrderCounts { total, pending },
            products: DashboardProducts {
                low_stock,
                top_selling,
            },
            sales_by_category,
        })
    }

    /// The latest orders, newest first, with who placed them.
    pub async fn recent_transactions(&self) -> DbResult<Vec<RecentTransaction>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT ?1"
        ))
        .bind(RECENT_TRANSACTIONS)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let orders = with_items(&mut conn, rows).await?;

        let customers: HashMap<String, Customer> = sqlx::query_as::<_, Customer>(
            r#"
            SELECT o.id AS order_id,
                   u.first_name || ' ' || u.last_name AS customer_name,
                   u.email AS customer_email
            FROM orders o
            JOIN users u ON u.id = o.user_id
            ORDER BY o.created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(RECENT_TRANSACTIONS)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|c| (c.order_id.clone(), c))
        .collect();

        Ok(orders
            .into_iter()
            .map(|order| {
                let (customer_name, customer_email) = customers
                    .get(&order.id)
                    .map(|c| (c.customer_name.clone(), c.customer_email.clone()))
                    .unwrap_or_default();
                RecentTransaction {
                    order,
                    customer_name,
                    customer_email,
                }
            })
            .collect())
    }

    /// Revenue and order count per day over the last seven days, zeros
    /// where nothing was sold.
    pub async fn sales_stats(&self, now: DateTime<Utc>) -> DbResult<Vec<DailySales>> {
        let clock = DashboardClock::at(now);

        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT substr(created_at, 1, 10) AS day,
                   SUM(total_cents) AS revenue_cents,
                   COUNT(*) AS orders
            FROM orders
            WHERE status != 'cancelled' AND created_at >= ?1 AND created_at <= ?2
            GROUP BY day
            "#,
        )
        .bind(clock.series_start)
        .bind(clock.now)
        .fetch_all(&self.pool)
        .await?;

        let days = rows
            .into_iter()
            .map(|row| {
                NaiveDate::parse_from_str(&row.day, "%Y-%m-%d")
                    .map(|day| (day, row.revenue_cents, row.orders))
                    .map_err(|e| DbError::Internal(format!("bad stored date {:?}: {e}", row.day)))
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(daily_series(clock.today(), &days))
    }

    async fn completed_revenue(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM orders WHERE status = 'completed' AND created_at >= ?1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::Database;
    use chrono::Duration;
    use tally_core::{OrderStatus, PaymentMethod, Role, User};

    async fn sell(db: &Database, user: &User, product_id: &str, qty: i64) -> Order {
        db.carts().add_item(&user.id, product_id, qty).await.unwrap();
        db.carts().checkout(&user.id, PaymentMethod::Cash).await.unwrap()
    }

    async fn backdate(db: &Database, order_id: &str, at: DateTime<Utc>) {
        sqlx::query("UPDATE orders SET created_at = ?2 WHERE id = ?1")
            .bind(order_id)
            .bind(at)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overview() {
        let db = fixtures::db().await;
        let clerk = fixtures::user(&db, "clerk@example.com", Role::User).await;
        let cola = fixtures::product(&db, "Cola", 200, 20).await;
        let lager = fixtures::product(&db, "Lager", 450, 6).await;
        fixtures::product(&db, "Absinthe", 3900, 1).await;

        let today = sell(&db, &clerk, &cola.id, 10).await;
        let old = sell(&db, &clerk, &lager.id, 3).await;
        sell(&db, &clerk, &cola.id, 1).await;
        let cancelled = sell(&db, &clerk, &lager.id, 2).await;

        for order in [&today, &old] {
            db.orders().update_status(&order.id, OrderStatus::Completed).await.unwrap();
        }
        db.orders().update_status(&cancelled.id, OrderStatus::Cancelled).await.unwrap();
        backdate(&db, &old.id, Utc::now() - Duration::days(400)).await;

        let overview = db.dashboard().overview(Utc::now()).await.unwrap();

        assert_eq!(overview.revenue.total_cents, 2000 + 1350);
        assert_eq!(overview.revenue.monthly_cents, 2000);
        assert_eq!(overview.revenue.daily_cents, 2000);
        assert_eq!(overview.orders, OrderCounts { total: 4, pending: 1 });

        // Lager went 6 → 3 → 1, Absinthe started at 1.
        let low: Vec<(&str, i64)> = overview
            .products
            .low_stock
            .iter()
            .map(|p| (p.name.as_str(), p.stock))
            .collect();
        assert_eq!(low, vec![("Absinthe", 1), ("Lager", 1)]);

        let top = &overview.products.top_selling;
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].name.as_str(), top[0].total_sold), ("Cola", 11));
        assert_eq!((top[1].total_sold, top[1].revenue_cents), (3, 1350));

        assert_eq!(overview.sales_by_category.len(), 1);
        assert_eq!(overview.sales_by_category[0].revenue_cents, 2200 + 1350);
    }

    #[tokio::test]
    async fn test_recent_transactions_and_sales_stats() {
        let db = fixtures::db().await;
        let clerk = fixtures::user(&db, "clerk@example.com", Role::User).await;
        let soda = fixtures::product(&db, "Soda", 100, 500).await;

        let mut placed = Vec::new();
        for _ in 0..12 {
            placed.push(sell(&db, &clerk, &soda.id, 1).await);
        }
        let now = Utc::now();
        for (age, order) in placed.iter().enumerate() {
            backdate(&db, &order.id, now - Duration::minutes(age as i64)).await;
        }
        backdate(&db, &placed[11].id, now - Duration::days(2)).await;
        backdate(&db, &placed[10].id, now - Duration::days(30)).await;

        let recent = db.dashboard().recent_transactions().await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].order.id, placed[0].id);
        assert_eq!(recent[0].customer_name, "Test User");
        assert_eq!(recent[0].customer_email, "clerk@example.com");
        assert_eq!(recent[0].order.items.len(), 1);

        let stats = db.dashboard().sales_stats(now).await.unwrap();
        assert_eq!(stats.len(), 7);
        assert_eq!(stats[6].date, now.date_naive());
        assert_eq!(stats.iter().map(|d| d.orders).sum::<i64>(), 11);
        assert_eq!(stats[4].orders, 1);
        assert_eq!(stats[4].revenue_cents, 100);
    }
}
