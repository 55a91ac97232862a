//! The caller's own cart. Checkout lives under `POST /orders`.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tally_core::Cart;
use ts_rs::TS;

use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AddToCartRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_item))
        .route("/clear", delete(clear_cart))
        .route("/{product_id}", put(update_item).delete(remove_item))
}

async fn get_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Cart>> {
    Ok(ApiResponse::ok(state.db.carts().get(&user.id).await?))
}

async fn add_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AddToCartRequest>,
) -> ApiResult<ApiResponse<Cart>> {
    let cart = state
        .db
        .carts()
        .add_item(&user.id, &body.product_id, body.quantity)
        .await?;
    Ok(ApiResponse::with_message(cart, "Item added to cart"))
}

async fn update_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<String>,
    Json(body): Json<UpdateCartItemRequest>,
) -> ApiResult<ApiResponse<Cart>> {
    let cart = state
        .db
        .carts()
        .update_quantity(&user.id, &product_id, body.quantity)
        .await?;
    Ok(ApiResponse::with_message(cart, "Cart updated"))
}

async fn remove_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<String>,
) -> ApiResult<ApiResponse<Cart>> {
    let cart = state.db.carts().remove_item(&user.id, &product_id).await?;
    Ok(ApiResponse::with_message(cart, "Item removed from cart"))
}

async fn clear_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<()>> {
    state.db.carts().clear(&user.id).await?;
    Ok(ApiResponse::with_message((), "Cart cleared"))
}
