//! # tally-api: REST Server for Tally
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Request Pipeline                                 │
//! │                                                                         │
//! │  HTTP ──► TraceLayer ──► CorsLayer ──► Router                          │
//! │                                          │                              │
//! │                ┌─────────────────────────┼──────────────────────┐       │
//! │                ▼                         ▼                      ▼       │
//! │         /health, /api/auth/      require_auth             404           │
//! │         login|register           (JWT → CurrentUser)                    │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                  handler: policy::require               │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                  tally-db repository                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod policy;
pub mod response;
pub mod state;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tally_core::user::NewUser;
use tally_core::validation::validate_password;
use tally_core::{Role, User};
use tally_db::Database;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{BootstrapAdmin, ConfigError};
use crate::error::ApiResult;
use crate::handlers::auth as auth_routes;
use crate::handlers::{
    cart, dashboard, health, orders, products, purchases, reports, users, vendors,
};
use crate::state::AppState;

pub use crate::config::ApiConfig;
pub use crate::error::{ApiError, ErrorCode};

/// The whole application, state attached.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let public = Router::new().nest("/auth", auth_routes::public_routes());

    let protected = Router::new()
        .nest("/auth", auth_routes::routes())
        .nest("/users", users::routes())
        .nest("/products", products::routes())
        .nest("/cart", cart::routes())
        .nest("/orders", orders::routes())
        .nest("/purchases", purchases::routes())
        .nest("/vendors", vendors::routes())
        .nest("/reports", reports::routes())
        .nest("/dashboard", dashboard::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", public.merge(protected))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allows the listed origins, or any origin when the list is empty.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidValue {
                    key: "cors_origins".to_string(),
                    reason: format!("'{origin}' is not a valid origin"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

/// Creates the configured administrator when there are no users at all.
///
/// Returns the new user, or `None` when accounts already exist.
pub async fn ensure_bootstrap_admin(db: &Database, admin: &BootstrapAdmin) -> ApiResult<Option<User>> {
    if db.users().count().await? > 0 {
        return Ok(None);
    }

    let new_user = NewUser::new(
        &admin.first_name,
        &admin.last_name,
        &admin.email,
        Role::Admin,
        None,
    )?;
    validate_password(&admin.password)?;
    let hash = auth::hash_password(&admin.password)?;

    let user = db.users().create(&new_user, &hash).await?;
    info!(user_id = %user.id, email = %user.email, "Bootstrap administrator created");
    Ok(Some(user))
}

