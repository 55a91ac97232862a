//! Admin landing page: overview figures, latest orders and the seven-day
//! sales series.

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tally_core::dashboard::{DailySales, DashboardOverview};
use tally_db::RecentTransaction;

use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::policy::{self, ADMIN_ONLY};
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/transactions", get(recent_transactions))
        .route("/sales-stats", get(sales_stats))
}

async fn overview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<DashboardOverview>> {
    policy::require(&state, &user, &ADMIN_ONLY)?;
    Ok(ApiResponse::ok(state.db.dashboard().overview(Utc::now()).await?))
}

/// The ten newest orders with the customer's name and email.
async fn recent_transactions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<RecentTransaction>>> {
    policy::require(&state, &user, &ADMIN_ONLY)?;
    Ok(ApiResponse::ok(state.db.dashboard().recent_transactions().await?))
}

async fn sales_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<DailySales>>> {
    policy::require(&state, &user, &ADMIN_ONLY)?;
    Ok(ApiResponse::ok(state.db.dashboard().sales_stats(Utc::now()).await?))
}
