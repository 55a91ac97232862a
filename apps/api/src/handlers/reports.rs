//! Financial reports (view_reports). Without `from`/`to` a report covers the
//! current month up to now.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tally_core::report::{CashFlowReport, DateRange, ExpenseReport, ProfitAndLoss};
use tally_core::PurchaseCategory;

use crate::error::ApiResult;
use crate::handlers::{month_start, range_or};
use crate::middleware::CurrentUser;
use crate::policy::{self, VIEW_REPORTS};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProfitLossQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub compare: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub category: Option<PurchaseCategory>,
    #[serde(alias = "vendor_id")]
    pub vendor_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profit-loss", get(profit_and_loss))
        .route("/cash-flow", get(cash_flow))
        .route("/expenses", get(expenses))
}

fn period(from: Option<&str>, to: Option<&str>) -> ApiResult<DateRange> {
    let now = Utc::now();
    range_or(from, to, month_start(now), now)
}

async fn profit_and_loss(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProfitLossQuery>,
) -> ApiResult<ApiResponse<ProfitAndLoss>> {
    policy::require(&state, &user, &VIEW_REPORTS)?;
    let range = period(query.from.as_deref(), query.to.as_deref())?;
    let report = state
        .db
        .reports()
        .profit_and_loss(range, query.compare)
        .await?;
    Ok(ApiResponse::ok(report))
}

async fn cash_flow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<ApiResponse<CashFlowReport>> {
    policy::require(&state, &user, &VIEW_REPORTS)?;
    let range = period(query.from.as_deref(), query.to.as_deref())?;
    Ok(ApiResponse::ok(state.db.reports().cash_flow(range).await?))
}

async fn expenses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExpenseQuery>,
) -> ApiResult<ApiResponse<ExpenseReport>> {
    policy::require(&state, &user, &VIEW_REPORTS)?;
    let range = period(query.from.as_deref(), query.to.as_deref())?;
    let report = state
        .db
        .reports()
        .expenses(range, query.category, query.vendor_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(report))
}
