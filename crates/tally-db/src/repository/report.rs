//! # Report Repository
//!
//! Read-only financial aggregations over orders and purchases.
//!
//! ## Sources
//! ```text
//! ┌───────────────────────────┬──────────────────────────────────────────────┐
//! │ Figure                    │ Rows                                         │
//! ├───────────────────────────┼──────────────────────────────────────────────┤
//! │ revenue, cash inflow      │ orders with status = completed               │
//! │ expenses (P&L, breakdown) │ purchases received/paid, by purchase_date    │
//! │ cash outflow              │ purchases paid, by payment_date              │
//! └───────────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are stored as RFC 3339 text, so `substr(ts, 1, 10)` is the UTC
//! day and `substr(ts, 1, 7)` the month.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::query::QueryAs;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;

use tally_core::report::{
    CashFlowReport, CategoryExpense, CategoryTotal, DateRange, ExpenseReport, MonthlyAmount,
    ProfitAndLoss, TermsAmount, VendorExpense,
};
use tally_core::PurchaseCategory;

use crate::error::{DbError, DbResult};

// =============================================================================
// Realized Spend
// =============================================================================

/// Which received/paid purchases an aggregation covers. `None` means
/// unrestricted.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SpendScope<'a> {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<PurchaseCategory>,
    pub vendor_id: Option<&'a str>,
}

impl SpendScope<'_> {
    pub fn range(range: &DateRange) -> Self {
        SpendScope {
            from: Some(range.from),
            to: Some(range.to),
            ..SpendScope::default()
        }
    }
}

/// Filter on `purchases p` matching [`SpendScope`], binding `?1`..`?4`.
const SPEND_SCOPE: &str = "p.status IN ('received', 'paid') \
     AND (?1 IS NULL OR p.purchase_date >= ?1) \
     AND (?2 IS NULL OR p.purchase_date <= ?2) \
     AND (?3 IS NULL OR p.category = ?3) \
     AND (?4 IS NULL OR p.vendor_id = ?4)";

fn scoped<'q, O>(sql: &'q str, scope: &SpendScope<'q>) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>>
where
    O: Send + Unpin + for<'r> sqlx::FromRow<'r, SqliteRow>,
{
    sqlx::query_as::<_, O>(sql)
        .bind(scope.from)
        .bind(scope.to)
        .bind(scope.category)
        .bind(scope.vendor_id)
}

pub(crate) async fn category_totals(
    pool: &SqlitePool,
    scope: &SpendScope<'_>,
) -> DbResult<Vec<CategoryTotal>> {
    let sql = format!(
        "SELECT p.category AS category, SUM(p.total_amount_cents) AS total_cents, COUNT(*) AS count \
         FROM purchases p WHERE {SPEND_SCOPE} GROUP BY p.category ORDER BY total_cents DESC"
    );
    Ok(scoped::<CategoryTotal>(&sql, scope).fetch_all(pool).await?)
}

pub(crate) async fn category_expenses(
    pool: &SqlitePool,
    scope: &SpendScope<'_>,
) -> DbResult<Vec<CategoryExpense>> {
    let sql = format!(
        r#"
        SELECT p.category AS category,
               SUM(p.total_amount_cents) AS total_cents,
               COUNT(*) AS count,
               SUM(p.total_amount_cents) / COUNT(*) AS avg_cents,
               MIN(p.total_amount_cents) AS min_cents,
               MAX(p.total_amount_cents) AS max_cents
        FROM purchases p
        WHERE {SPEND_SCOPE}
        GROUP BY p.category
        ORDER BY total_cents DESC
        "#
    );
    Ok(scoped::<CategoryExpense>(&sql, scope).fetch_all(pool).await?)
}

/// Vendors by realized spend, largest first.
pub(crate) async fn vendor_expenses(
    pool: &SqlitePool,
    scope: &SpendScope<'_>,
    limit: i64,
) -> DbResult<Vec<VendorExpense>> {
    let sql = format!(
        r#"
        SELECT v.id AS vendor_id,
               v.name AS vendor_name,
               SUM(p.total_amount_cents) AS total_cents,
               COUNT(*) AS count,
               SUM(p.total_amount_cents) / COUNT(*) AS avg_cents
        FROM purchases p
        JOIN vendors v ON v.id = p.vendor_id
        WHERE {SPEND_SCOPE}
        GROUP BY v.id, v.name
        ORDER BY total_cents DESC
        LIMIT ?5
        "#
    );
    Ok(scoped::<VendorExpense>(&sql, scope)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

/// Spend per `YYYY-MM`, ascending. With `by_category` each month is split
/// further.
pub(crate) async fn monthly_amounts(
    pool: &SqlitePool,
    scope: &SpendScope<'_>,
    by_category: bool,
) -> DbResult<Vec<MonthlyAmount>> {
    let (category, group) = if by_category {
        ("p.category", "month, p.category")
    } else {
        ("NULL", "month")
    };
    let sql = format!(
        r#"
        SELECT substr(p.purchase_date, 1, 7) AS month,
               {category} AS category,
               SUM(p.total_amount_cents) AS total_cents,
               COUNT(*) AS count
        FROM purchases p
        WHERE {SPEND_SCOPE}
        GROUP BY {group}
        ORDER BY {group}
        "#
    );
    Ok(scoped::<MonthlyAmount>(&sql, scope).fetch_all(pool).await?)
}

pub(crate) async fn terms_amounts(
    pool: &SqlitePool,
    scope: &SpendScope<'_>,
) -> DbResult<Vec<TermsAmount>> {
    let sql = format!(
        "SELECT p.payment_terms AS payment_terms, COUNT(*) AS count, \
                SUM(p.total_amount_cents) AS total_cents \
         FROM purchases p WHERE {SPEND_SCOPE} GROUP BY p.payment_terms ORDER BY total_cents DESC"
    );
    Ok(scoped::<TermsAmount>(&sql, scope).fetch_all(pool).await?)
}

// =============================================================================
// Report Repository
// =============================================================================

#[derive(sqlx::FromRow)]
struct RevenueRow {
    order_count: i64,
    revenue_cents: i64,
}

#[derive(sqlx::FromRow)]
struct DailyAmount {
    day: String,
    total_cents: i64,
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Profit & loss over `range`. With `compare`, the previous period of the
    /// same length is computed too and the deltas attached.
    pub async fn profit_and_loss(&self, range: DateRange, compare: bool) -> DbResult<ProfitAndLoss> {
        debug!(from = %range.from, to = %range.to, compare, "Computing profit and loss");

        let current = self.pnl_for(range).await?;
        if !compare {
            return Ok(current);
        }
        let previous = self.pnl_for(range.previous()).await?;
        Ok(current.compare_with(&previous))
    }

    async fn pnl_for(&self, range: DateRange) -> DbResult<ProfitAndLoss> {
        let revenue = sqlx::query_as::<_, RevenueRow>(
            r#"
            SELECT COUNT(*) AS order_count, COALESCE(SUM(total_cents), 0) AS revenue_cents
            FROM orders
            WHERE status = 'completed' AND created_at >= ?1 AND created_at <= ?2
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        let expenses = category_totals(&self.pool, &SpendScope::range(&range)).await?;
        Ok(ProfitAndLoss::compute(
            range,
            revenue.revenue_cents,
            revenue.order_count,
            expenses,
        ))
    }

    /// Daily completed-sales inflows against paid-purchase outflows.
    pub async fn cash_flow(&self, range: DateRange) -> DbResult<CashFlowReport> {
        debug!(from = %range.from, to = %range.to, "Computing cash flow");

        let inflows = sqlx::query_as::<_, DailyAmount>(
            r#"
            SELECT substr(created_at, 1, 10) AS day, SUM(total_cents) AS total_cents
            FROM orders
            WHERE status = 'completed' AND created_at >= ?1 AND created_at <= ?2
            GROUP BY day
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let outflows = sqlx::query_as::<_, DailyAmount>(
            r#"
            SELECT substr(payment_date, 1, 10) AS day, SUM(total_amount_cents) AS total_cents
            FROM purchases
            WHERE status = 'paid'
              AND payment_date IS NOT NULL
              AND payment_date >= ?1 AND payment_date <= ?2
            GROUP BY day
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(CashFlowReport::build(
            range,
            &by_day(inflows)?,
            &by_day(outflows)?,
        ))
    }

    /// Realized spend in `range`, optionally narrowed to one category or
    /// vendor.
    pub async fn expenses(
        &self,
        range: DateRange,
        category: Option<PurchaseCategory>,
        vendor_id: Option<&str>,
    ) -> DbResult<ExpenseReport> {
        debug!(from = %range.from, to = %range.to, ?category, ?vendor_id, "Computing expenses");

        let scope = SpendScope {
            category,
            vendor_id,
            ..SpendScope::range(&range)
        };

        let by_category = category_expenses(&self.pool, &scope).await?;
        let by_vendor = vendor_expenses(&self.pool, &scope, 10).await?;
        let monthly = monthly_amounts(&self.pool, &scope, true).await?;

        Ok(ExpenseReport {
            period: range,
            total_expenses_cents: by_category.iter().map(|c| c.total_cents).sum(),
            by_category,
            by_vendor,
            monthly,
        })
    }
}

fn by_day(rows: Vec<DailyAmount>) -> DbResult<Vec<(NaiveDate, i64)>> {
    rows.into_iter()
        .map(|row| {
            NaiveDate::parse_from_str(&row.day, "%Y-%m-%d")
                .map(|day| (day, row.total_cents))
                .map_err(|e| DbError::Internal(format!("bad stored date {:?}: {e}", row.day)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Duration;
    use tally_core::{OrderStatus, PaymentMethod, PurchaseStatus, Role};

    fn around_now() -> DateRange {
        let now = Utc::now();
        DateRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap()
    }

    async fn books() -> crate::Database {
        let db = fixtures::db().await;
        let admin = fixtures::user(&db, "admin@example.com", Role::Admin).await;
        let clerk = fixtures::user(&db, "clerk@example.com", Role::User).await;

        let product = fixtures::product(&db, "House Red", 500, 50).await;
        db.carts().add_item(&clerk.id, &product.id, 10).await.unwrap();
        let order = db.carts().checkout(&clerk.id, PaymentMethod::Card).await.unwrap();
        db.orders().update_status(&order.id, OrderStatus::Completed).await.unwrap();

        // A pending order never counts as revenue.
        db.carts().add_item(&clerk.id, &product.id, 1).await.unwrap();
        db.carts().checkout(&clerk.id, PaymentMethod::Cash).await.unwrap();

        let vendor = fixtures::vendor(&db, "Cellar Supply").await;
        let materials =
            fixtures::purchase(&db, &admin, &vendor.id, PurchaseCategory::Materials, 2_000).await;
        fixtures::advance(&db, &admin, &materials.id, PurchaseStatus::Paid).await;
        let rent = fixtures::purchase(&db, &admin, &vendor.id, PurchaseCategory::Rent, 1_000).await;
        fixtures::advance(&db, &admin, &rent.id, PurchaseStatus::Received).await;
        fixtures::purchase(&db, &admin, &vendor.id, PurchaseCategory::Marketing, 700).await;

        db
    }

    #[tokio::test]
    async fn test_profit_and_loss() {
        let db = books().await;
        let pnl = db.reports().profit_and_loss(around_now(), false).await.unwrap();

        assert_eq!(pnl.revenue_cents, 5_000);
        assert_eq!(pnl.order_count, 1);
        assert_eq!(pnl.cost_of_goods_sold_cents, 2_000);
        assert_eq!(pnl.operating_expenses_cents, 1_000);
        assert_eq!(pnl.gross_profit_cents, 3_000);
        assert_eq!(pnl.gross_margin_bps, 6_000);
        assert_eq!(pnl.net_income_cents, 2_000);
        assert!(pnl.comparison.is_none());
    }

    #[tokio::test]
    async fn test_profit_and_loss_comparison_against_empty_period() {
        let db = books().await;
        let pnl = db.reports().profit_and_loss(around_now(), true).await.unwrap();

        let comparison = pnl.comparison.unwrap();
        assert_eq!(comparison.previous_revenue_cents, 0);
        assert_eq!(comparison.revenue_change_bps, 0);
    }

    #[tokio::test]
    async fn test_cash_flow() {
        let db = books().await;
        let flow = db.reports().cash_flow(around_now()).await.unwrap();

        assert_eq!(flow.total_inflow_cents, 5_000);
        assert_eq!(flow.total_outflow_cents, 2_000);
        assert_eq!(flow.net_cash_flow_cents, 3_000);
        assert!(!flow.days.is_empty());
        assert_eq!(flow.days.last().unwrap().balance_cents, 3_000);
    }

    #[tokio::test]
    async fn test_expense_breakdown() {
        let db = books().await;
        let report = db.reports().expenses(around_now(), None, None).await.unwrap();

        assert_eq!(report.total_expenses_cents, 3_000);
        assert_eq!(report.by_category.len(), 2);
        assert_eq!(report.by_category[0].category, PurchaseCategory::Materials);
        assert_eq!(report.by_vendor.len(), 1);
        assert_eq!(report.by_vendor[0].count, 2);
        assert_eq!(report.monthly.iter().map(|m| m.total_cents).sum::<i64>(), 3_000);

        let rent_only = db
            .reports()
            .expenses(around_now(), Some(PurchaseCategory::Rent), None)
            .await
            .unwrap();
        assert_eq!(rent_only.total_expenses_cents, 1_000);
    }
}
