//! Purchase orders.
//!
//! | Route                     | Policy            |
//! |---------------------------|-------------------|
//! | `GET /`, `GET /{id}`      | view_purchases    |
//! | `GET /analytics`          | view_purchases    |
//! | `POST /`, `PUT /{id}`     | create_purchases  |
//! | `PUT /bulk`               | create_purchases  |
//! | `DELETE /{id}`            | delete_purchases  |
//!
//! Moving a purchase out of pending additionally needs approve_purchases,
//! checked per purchase by the repository.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use tally_core::purchase::{NewPurchase, PurchasePatch};
use tally_core::report::PurchaseAnalytics;
use tally_core::{PageRequest, Purchase, PurchaseCategory, PurchaseStatus};
use tally_db::{BulkUpdateResult, PurchaseFilter, PurchaseList};
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{optional_range, parse_instant};
use crate::middleware::CurrentUser;
use crate::policy::{self, CREATE_PURCHASES, DELETE_PURCHASES, VIEW_PURCHASES};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Most purchases one bulk request may touch.
pub const MAX_BULK_IDS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseListQuery {
    pub status: Option<PurchaseStatus>,
    pub category: Option<PurchaseCategory>,
    #[serde(alias = "vendor_id")]
    pub vendor_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BulkUpdateRequest {
    pub ids: Vec<String>,
    pub patch: PurchasePatch,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchases).post(create_purchase))
        .route("/analytics", get(analytics))
        .route("/bulk", put(bulk_update))
        .route(
            "/{id}",
            get(get_purchase).put(update_purchase).delete(delete_purchase),
        )
}

async fn list_purchases(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PurchaseListQuery>,
) -> ApiResult<ApiResponse<PurchaseList>> {
    policy::require(&state, &user, &VIEW_PURCHASES)?;
    let request = PageRequest::new(query.page, query.limit)?;
    let filter = PurchaseFilter {
        status: query.status,
        category: query.category,
        vendor_id: query.vendor_id,
        from: query
            .from
            .as_deref()
            .map(|raw| parse_instant("from", raw, false))
            .transpose()?,
        to: query
            .to
            .as_deref()
            .map(|raw| parse_instant("to", raw, true))
            .transpose()?,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    Ok(ApiResponse::ok(state.db.purchases().list(&filter, request).await?))
}

async fn create_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewPurchase>,
) -> ApiResult<ApiResponse<Purchase>> {
    policy::require(&state, &user, &CREATE_PURCHASES)?;
    let purchase = state.db.purchases().create(&body, &user).await?;
    Ok(ApiResponse::created(purchase, "Purchase created"))
}

async fn get_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Purchase>> {
    policy::require(&state, &user, &VIEW_PURCHASES)?;
    Ok(ApiResponse::ok(state.db.purchases().get(&id).await?))
}

async fn update_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<PurchasePatch>,
) -> ApiResult<ApiResponse<Purchase>> {
    policy::require(&state, &user, &CREATE_PURCHASES)?;
    if patch == PurchasePatch::default() {
        return Err(ApiError::validation("Nothing to update"));
    }
    let purchase = state
        .db
        .purchases()
        .update(&id, &patch, &user, &state.permissions)
        .await?;
    Ok(ApiResponse::with_message(purchase, "Purchase updated"))
}

async fn bulk_update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BulkUpdateRequest>,
) -> ApiResult<ApiResponse<BulkUpdateResult>> {
    policy::require(&state, &user, &CREATE_PURCHASES)?;
    if body.ids.is_empty() {
        return Err(ApiError::validation("ids must not be empty"));
    }
    if body.ids.len() > MAX_BULK_IDS {
        return Err(ApiError::validation(format!(
            "At most {MAX_BULK_IDS} purchases can be updated at once"
        )));
    }
    if body.patch == PurchasePatch::default() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let result = state
        .db
        .purchases()
        .bulk_update(&body.ids, &body.patch, &user, &state.permissions)
        .await?;
    let message = format!("{} of {} purchases updated", result.modified, result.matched);
    Ok(ApiResponse::with_message(result, message))
}

async fn delete_purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    policy::require(&state, &user, &DELETE_PURCHASES)?;
    state.db.purchases().delete(&id).await?;
    Ok(ApiResponse::with_message((), "Purchase deleted"))
}

async fn analytics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<ApiResponse<PurchaseAnalytics>> {
    policy::require(&state, &user, &VIEW_PURCHASES)?;
    let range = optional_range(query.from.as_deref(), query.to.as_deref())?;
    Ok(ApiResponse::ok(state.db.purchases().analytics(range).await?))
}
