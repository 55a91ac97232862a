//! # Reports
//!
//! Financial report shapes and the arithmetic behind them. The database layer
//! runs the aggregation queries; everything that is a formula lives here.
//!
//! ## Profit & Loss
//! ```text
//!   revenue                      (completed orders in range)
//! − cost of goods sold           (materials + labor + manufacturing)
//! ───────────────────────────
//! = gross profit                 margin = gross profit / revenue
//! − operating expenses           (salaries, rent, utilities, marketing,
//! ───────────────────────────     insurance, depreciation, other)
//! = operating income = net income
//! ```
//!
//! Only purchases that are received or paid, with a purchase date in the
//! range, count as expenses.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::purchase::{PaymentTerms, PurchaseCategory, PurchaseStatus};
use crate::validation::{validate_date_range, ValidationResult};
use crate::vendor::VendorStatus;

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> ValidationResult<Self> {
        validate_date_range(from, to)?;
        Ok(DateRange { from, to })
    }

    /// The window of equal length that ends just before this one starts.
    pub fn previous(&self) -> DateRange {
        let length = self.to - self.from;
        let to = self.from - chrono::Duration::milliseconds(1);
        DateRange {
            from: to - length,
            to,
        }
    }
}

// =============================================================================
// Profit & Loss
// =============================================================================

/// Expense total for one purchase category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CategoryTotal {
    pub category: PurchaseCategory,
    pub total_cents: i64,
    pub count: i64,
}

/// Deltas against the previous period, in basis points of the previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PeriodComparison {
    pub previous: DateRange,
    pub previous_revenue_cents: i64,
    pub previous_gross_profit_cents: i64,
    pub previous_net_income_cents: i64,
    pub revenue_change_bps: i64,
    pub gross_profit_change_bps: i64,
    pub net_income_change_bps: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfitAndLoss {
    pub period: DateRange,
    pub revenue_cents: i64,
    pub order_count: i64,
    pub cost_of_goods_sold: Vec<CategoryTotal>,
    pub cost_of_goods_sold_cents: i64,
    pub operating_expenses: Vec<CategoryTotal>,
    pub operating_expenses_cents: i64,
    pub gross_profit_cents: i64,
    /// Gross profit / revenue, 0 when there is no revenue.
    pub gross_margin_bps: i64,
    pub operating_income_cents: i64,
    pub net_income_cents: i64,
    pub comparison: Option<PeriodComparison>,
}

impl ProfitAndLoss {
    /// Splits `expenses` into COGS and operating buckets and derives the rest.
    pub fn compute(
        period: DateRange,
        revenue_cents: i64,
        order_count: i64,
        expenses: Vec<CategoryTotal>,
    ) -> Self {
        let (cogs, operating): (Vec<_>, Vec<_>) =
            expenses.into_iter().partition(|c| c.category.is_cogs());

        let sum = |rows: &[CategoryTotal]| -> Money {
            rows.iter().map(|c| Money::from_cents(c.total_cents)).sum()
        };

        let revenue = Money::from_cents(revenue_cents);
        let cogs_total = sum(&cogs);
        let operating_total = sum(&operating);
        let gross_profit = revenue - cogs_total;
        let operating_income = gross_profit - operating_total;

        ProfitAndLoss {
            period,
            revenue_cents,
            order_count,
            cost_of_goods_sold: cogs,
            cost_of_goods_sold_cents: cogs_total.cents(),
            operating_expenses: operating,
            operating_expenses_cents: operating_total.cents(),
            gross_profit_cents: gross_profit.cents(),
            gross_margin_bps: gross_profit.ratio_bps(revenue),
            operating_income_cents: operating_income.cents(),
            net_income_cents: operating_income.cents(),
            comparison: None,
        }
    }

    /// Attaches the deltas against `previous`.
    pub fn compare_with(mut self, previous: &ProfitAndLoss) -> Self {
        self.comparison = Some(PeriodComparison {
            previous: previous.period,
            previous_revenue_cents: previous.revenue_cents,
            previous_gross_profit_cents: previous.gross_profit_cents,
            previous_net_income_cents: previous.net_income_cents,
            revenue_change_bps: change_bps(self.revenue_cents, previous.revenue_cents),
            gross_profit_change_bps: change_bps(
                self.gross_profit_cents,
                previous.gross_profit_cents,
            ),
            net_income_change_bps: change_bps(self.net_income_cents, previous.net_income_cents),
        });
        self
    }
}

/// `(current - previous) / |previous|` in basis points, 0 from a zero base.
fn change_bps(current: i64, previous: i64) -> i64 {
    Money::from_cents(current - previous).ratio_bps(Money::from_cents(previous.abs()))
}

// =============================================================================
// Cash Flow
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CashFlowDay {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub inflow_cents: i64,
    pub outflow_cents: i64,
    pub net_cents: i64,
    /// Running total of `net_cents` from the start of the range.
    pub balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CashFlowReport {
    pub period: DateRange,
    pub days: Vec<CashFlowDay>,
    pub total_inflow_cents: i64,
    pub total_outflow_cents: i64,
    pub net_cash_flow_cents: i64,
}

impl CashFlowReport {
    /// Merges per-day inflows (sales) and outflows (purchase payments) into
    /// one ascending series with a running balance. Days with neither are
    /// omitted.
    pub fn build(
        period: DateRange,
        inflows: &[(NaiveDate, i64)],
        outflows: &[(NaiveDate, i64)],
    ) -> Self {
        let mut by_day: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
        for (day, cents) in inflows {
            by_day.entry(*day).or_default().0 += cents;
        }
        for (day, cents) in outflows {
            by_day.entry(*day).or_default().1 += cents;
        }

        let mut balance = 0;
        let days: Vec<CashFlowDay> = by_day
            .into_iter()
            .map(|(date, (inflow, outflow))| {
                let net = inflow - outflow;
                balance += net;
                CashFlowDay {
                    date,
                    inflow_cents: inflow,
                    outflow_cents: outflow,
                    net_cents: net,
                    balance_cents: balance,
                }
            })
            .collect();

        let total_inflow_cents = days.iter().map(|d| d.inflow_cents).sum();
        let total_outflow_cents = days.iter().map(|d| d.outflow_cents).sum();

        CashFlowReport {
            period,
            days,
            total_inflow_cents,
            total_outflow_cents,
            net_cash_flow_cents: balance,
        }
    }
}

// =============================================================================
// Expense & Analytics Shapes
// =============================================================================

/// Per-category spend with spread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CategoryExpense {
    pub category: PurchaseCategory,
    pub total_cents: i64,
    pub count: i64,
    pub avg_cents: i64,
    pub min_cents: i64,
    pub max_cents: i64,
}

/// Per-vendor spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorExpense {
    pub vendor_id: String,
    pub vendor_name: String,
    pub total_cents: i64,
    pub count: i64,
    pub avg_cents: i64,
}

/// Spend in one calendar month (`YYYY-MM`), optionally split by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MonthlyAmount {
    pub month: String,
    pub category: Option<PurchaseCategory>,
    pub total_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusAmount {
    pub status: PurchaseStatus,
    pub count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TermsAmount {
    pub payment_terms: PaymentTerms,
    pub count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OverdueSummary {
    pub count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExpenseReport {
    pub period: DateRange,
    pub total_expenses_cents: i64,
    pub by_category: Vec<CategoryExpense>,
    pub by_vendor: Vec<VendorExpense>,
    pub monthly: Vec<MonthlyAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseAnalytics {
    pub category_totals: Vec<CategoryExpense>,
    pub monthly_trends: Vec<MonthlyAmount>,
    pub status_summary: Vec<StatusAmount>,
    pub top_vendors: Vec<VendorExpense>,
    pub payment_terms: Vec<TermsAmount>,
    pub overdue: OverdueSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorStatusCount {
    pub status: VendorStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorAnalytics {
    pub top_vendors: Vec<VendorExpense>,
    pub status_distribution: Vec<VendorStatusCount>,
    pub payment_terms_distribution: Vec<TermsAmount>,
}

// =============================================================================
// Unit Tests
// =============================================================================
