//! Checkout, order history and the daily sales summary.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tally_core::order::SalesSummary;
use tally_core::{Order, OrderStatus, Page, PageRequest, PaymentMethod};
use tally_db::OrderFilter;
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{range_or, today};
use crate::middleware::CurrentUser;
use crate::policy::{self, ADMIN_ONLY};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateOrderRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(my_orders).post(checkout))
        .route("/admin", get(all_orders))
        .route("/sales", get(sales_summary))
        .route("/{id}", get(get_order).put(update_order))
}

async fn checkout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<ApiResponse<Order>> {
    let order = state
        .db
        .carts()
        .checkout(&user.id, body.payment_method)
        .await?;
    Ok(ApiResponse::created(order, "Order placed"))
}

async fn my_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<Order>>> {
    Ok(ApiResponse::ok(state.db.orders().list_for_user(&user.id).await?))
}

async fn all_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AdminOrderQuery>,
) -> ApiResult<ApiResponse<Page<Order>>> {
    policy::require(&state, &user, &ADMIN_ONLY)?;
    let request = PageRequest::new(query.page, query.limit)?;
    let filter = OrderFilter {
        status: query.status,
        user_id: None,
    };
    Ok(ApiResponse::ok(state.db.orders().list(&filter, request).await?))
}

/// Defaults to today, UTC.
async fn sales_summary(
    State(state): State<AppState>,
    Query(query): Query<SalesQuery>,
) -> ApiResult<ApiResponse<SalesSummary>> {
    let day = today(Utc::now())?;
    let range = range_or(query.from.as_deref(), query.to.as_deref(), day.from, day.to)?;
    let summary = state.db.orders().sales_summary(range.from, range.to).await?;
    Ok(ApiResponse::ok(summary))
}

/// Owner or admin.
async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Order>> {
    let order = state.db.orders().get(&id).await?;
    if order.user_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Not allowed to view this order"));
    }
    Ok(ApiResponse::ok(order))
}

async fn update_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateOrderRequest>,
) -> ApiResult<ApiResponse<Order>> {
    policy::require(&state, &user, &ADMIN_ONLY)?;
    let order = state.db.orders().update_status(&id, body.status).await?;
    Ok(ApiResponse::with_message(order, "Order status updated"))
}
