//! Session guard.
//!
//! ```text
//! Authorization: Bearer <jwt>
//!        │
//!        ▼
//! require_auth ── no header / bad token ──► 401 UNAUTHENTICATED
//!        │
//!        ├── user gone ───────────────────► 401 UNAUTHENTICATED
//!        ├── user deactivated ────────────► 401 ACCOUNT_DISABLED
//!        ▼
//! req.extensions: CurrentUser ──► handler(CurrentUser(user), ..)
//! ```
//!
//! The user row is reloaded on every request, so role changes and
//! deactivation apply to tokens already issued.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tally_core::User;

use crate::auth::extract_bearer_token;
use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

/// The authenticated caller. Only available behind [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;
    let token = extract_bearer_token(header)
        .ok_or_else(|| ApiError::unauthenticated("Invalid authorization header"))?;

    let claims = state.jwt.validate_access_token(token)?;

    let user = state
        .db
        .users()
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("User no longer exists"))?;
    if !user.is_active {
        tracing::warn!(user_id = %user.id, "Token used for deactivated account");
        return Err(ApiError::new(
            ErrorCode::AccountDisabled,
            "Account is deactivated",
        ));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))
    }
}
