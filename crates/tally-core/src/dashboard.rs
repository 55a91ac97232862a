//! # Dashboard
//!
//! Figures for the administrator landing page. tally-db runs the queries;
//! the cut-off instants, the fixed list sizes and the seven-day series live
//! here.
//!
//! ```text
//!  overview ──► revenue (all time / this month / today, completed orders)
//!           ──► orders  (total / pending)
//!           ──► products (stock below 5, five best sellers)
//!           ──► sales by product category
//!
//!  sales-stats ──► one entry per day, oldest first, today last
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::product::ProductCategory;

/// Products with stock strictly below this are listed as low.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

/// Length of the best-seller list.
pub const TOP_SELLERS: i64 = 5;

/// Length of the recent-transactions list.
pub const RECENT_TRANSACTIONS: i64 = 10;

/// Days covered by the sales series, today included.
pub const SALES_STATS_DAYS: i64 = 7;

// =============================================================================
// Cut-off Instants
// =============================================================================

/// UTC boundaries the dashboard figures are cut at, all derived from one
/// `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardClock {
    pub now: DateTime<Utc>,
    /// Midnight on the first of the current month.
    pub month_start: DateTime<Utc>,
    /// Midnight today.
    pub day_start: DateTime<Utc>,
    /// Midnight on the first day of the sales series.
    pub series_start: DateTime<Utc>,
}

impl DashboardClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let first_of_month = today.with_day(1).unwrap_or(today);
        let first_of_series = today - Duration::days(SALES_STATS_DAYS - 1);

        DashboardClock {
            now,
            month_start: midnight(first_of_month),
            day_start: midnight(today),
            series_start: midnight(first_of_series),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

// =============================================================================
// Overview
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RevenueSummary {
    pub total_cents: i64,
    pub monthly_cents: i64,
    pub daily_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderCounts {
    pub total: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LowStockProduct {
    pub id: String,
    pub name: String,
    pub stock: i64,
    pub category: ProductCategory,
}

/// Units and revenue of one product across non-cancelled orders. The name is
/// the one frozen on the order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TopSeller {
    pub product_id: String,
    pub name: String,
    pub total_sold: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CategorySales {
    pub category: ProductCategory,
    pub total_sold: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardProducts {
    /// Lowest stock first.
    pub low_stock: Vec<LowStockProduct>,
    /// Most units sold first.
    pub top_selling: Vec<TopSeller>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardOverview {
    pub revenue: RevenueSummary,
    pub orders: OrderCounts,
    pub products: DashboardProducts,
    /// Highest revenue first.
    pub sales_by_category: Vec<CategorySales>,
}

// =============================================================================
// Sales Series
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DailySales {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub revenue_cents: i64,
    pub orders: i64,
}

/// One entry per day from `today - 6` to `today`. `rows` holds
/// `(day, revenue_cents, orders)`; days without a row are zero, and rows
/// outside the window are dropped.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tally_core::dashboard::daily_series;
///
/// let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
/// let series = daily_series(today, &[(today, 1500, 2)]);
///
/// assert_eq!(series.len(), 7);
/// assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
/// assert_eq!((series[6].revenue_cents, series[6].orders), (1500, 2));
/// assert_eq!(series[5].revenue_cents, 0);
/// ```
pub fn daily_series(today: NaiveDate, rows: &[(NaiveDate, i64, i64)]) -> Vec<DailySales> {
    let by_day: HashMap<NaiveDate, (i64, i64)> = rows
        .iter()
        .map(|(day, revenue, orders)| (*day, (*revenue, *orders)))
        .collect();

    (0..SALES_STATS_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let (revenue_cents, orders) = by_day.get(&date).copied().unwrap_or((0, 0));
            DailySales {
                date,
                revenue_cents,
                orders,
            }
        })
        .collect()
}
