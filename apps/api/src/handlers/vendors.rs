//! Suppliers. Reads need view_purchases or manage_vendors, writes need
//! manage_vendors.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tally_core::report::VendorAnalytics;
use tally_core::vendor::VendorInput;
use tally_core::{Page, PageRequest, Vendor, VendorStatus};
use tally_db::{VendorDetail, VendorFilter};

use crate::error::ApiResult;
use crate::handlers::optional_range;
use crate::middleware::CurrentUser;
use crate::policy::{self, MANAGE_VENDORS, VIEW_VENDORS};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VendorListQuery {
    pub status: Option<VendorStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VendorAnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vendors).post(create_vendor))
        .route("/analytics", get(analytics))
        .route(
            "/{id}",
            get(get_vendor).put(update_vendor).delete(delete_vendor),
        )
}

async fn list_vendors(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VendorListQuery>,
) -> ApiResult<ApiResponse<Page<Vendor>>> {
    policy::require(&state, &user, &VIEW_VENDORS)?;
    let request = PageRequest::new(query.page, query.limit)?;
    let filter = VendorFilter {
        status: query.status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    Ok(ApiResponse::ok(state.db.vendors().list(&filter, request).await?))
}

async fn create_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<VendorInput>,
) -> ApiResult<ApiResponse<Vendor>> {
    policy::require(&state, &user, &MANAGE_VENDORS)?;
    let vendor = state.db.vendors().create(&body, &user.id).await?;
    Ok(ApiResponse::created(vendor, "Vendor created"))
}

/// The vendor plus live purchase statistics.
async fn get_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<VendorDetail>> {
    policy::require(&state, &user, &VIEW_VENDORS)?;
    Ok(ApiResponse::ok(state.db.vendors().get_detail(&id).await?))
}

async fn update_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<VendorInput>,
) -> ApiResult<ApiResponse<Vendor>> {
    policy::require(&state, &user, &MANAGE_VENDORS)?;
    let vendor = state.db.vendors().update(&id, &body).await?;
    Ok(ApiResponse::with_message(vendor, "Vendor updated"))
}

async fn delete_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    policy::require(&state, &user, &MANAGE_VENDORS)?;
    state.db.vendors().delete(&id).await?;
    Ok(ApiResponse::with_message((), "Vendor deleted"))
}

async fn analytics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VendorAnalyticsQuery>,
) -> ApiResult<ApiResponse<VendorAnalytics>> {
    policy::require(&state, &user, &VIEW_VENDORS)?;
    let range = optional_range(query.from.as_deref(), query.to.as_deref())?;
    Ok(ApiResponse::ok(state.db.vendors().analytics(range).await?))
}
