//! Catalogue and stock.
//!
//! Reads are open to any signed-in user, writes need the manager role.
//! `PUT /products/{id}` with `{stock: n}` adds n units through the ledger.
//! It never sets the stock to n.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tally_core::product::{NewProduct, ProductPatch};
use tally_core::{Page, PageRequest, Product, ProductCategory, StockEntry};
use tally_db::ProductFilter;
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;
use crate::policy::{self, MANAGE_PRODUCTS};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<ProductCategory>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Restock and/or edit. At least one field must be present.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateProductRequest {
    /// Units to add.
    pub stock: Option<i64>,
    /// Ledger note for the restock.
    pub note: Option<String>,
    #[serde(flatten)]
    pub patch: ProductPatch,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/barcode/{code}", get(get_by_barcode))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/history", get(stock_history))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<ApiResponse<Page<Product>>> {
    let request = PageRequest::new(query.page, query.limit)?;
    let filter = ProductFilter {
        category: query.category,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    Ok(ApiResponse::ok(state.db.products().list(&filter, request).await?))
}

async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewProduct>,
) -> ApiResult<ApiResponse<Product>> {
    policy::require(&state, &user, &MANAGE_PRODUCTS)?;
    let product = state.db.products().create(&body, Some(&user.id)).await?;
    Ok(ApiResponse::created(product, "Product created"))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Product>> {
    Ok(ApiResponse::ok(state.db.products().get(&id).await?))
}

async fn get_by_barcode(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<ApiResponse<Product>> {
    Ok(ApiResponse::ok(state.db.products().get_by_barcode(&code).await?))
}

async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProductRequest>,
) -> ApiResult<ApiResponse<Product>> {
    policy::require(&state, &user, &MANAGE_PRODUCTS)?;
    if body.stock.is_none() && body.patch.is_empty() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let products = state.db.products();
    let mut product = if body.patch.is_empty() {
        products.get(&id).await?
    } else {
        products.update(&id, &body.patch).await?
    };
    if let Some(quantity) = body.stock {
        product = products
            .restock(&id, quantity, body.note, Some(&user.id))
            .await?;
    }

    Ok(ApiResponse::with_message(product, "Product updated"))
}

async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    policy::require(&state, &user, &MANAGE_PRODUCTS)?;
    state.db.products().delete(&id).await?;
    Ok(ApiResponse::with_message((), "Product deleted"))
}

async fn stock_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Vec<StockEntry>>> {
    Ok(ApiResponse::ok(state.db.products().history(&id).await?))
}
