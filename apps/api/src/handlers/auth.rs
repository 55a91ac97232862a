//! Login, registration and the caller's own account.
//!
//! ## Login Flow
//! ```text
//! POST /api/auth/login {email, password}
//!      │
//!      ├── unknown email ──────────┐
//!      ├── wrong password ─────────┴──► 401 "Invalid credentials"
//!      ├── deactivated ────────────────► 401 ACCOUNT_DISABLED
//!      ▼
//! {token, user}  then last_login is stamped in the background
//! ```

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tally_core::user::{NewUser, ProfilePatch};
use tally_core::validation::validate_password;
use tally_core::{Department, Permission, Role, User};
use tracing::{info, warn};
use ts_rs::TS;

use crate::auth::{hash_password, verify_password};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;

// =============================================================================
// Request / Response Bodies
// =============================================================================

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub department: Option<Department>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Me {
    pub user: User,
    pub permissions: Vec<Permission>,
}

// =============================================================================
// Routes
// =============================================================================

/// Reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/update-profile", put(update_profile))
        .route("/change-password", post(change_password))
}

// =============================================================================
// Handlers
// =============================================================================

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<ApiResponse<AuthSession>> {
    let invalid = || ApiError::unauthenticated("Invalid credentials");

    let record = state
        .db
        .users()
        .find_credentials_by_email(&body.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&body.password, &record.password_hash) {
        warn!(user_id = %record.user.id, "Failed login");
        return Err(invalid());
    }
    if !record.user.is_active {
        return Err(ApiError::new(ErrorCode::AccountDisabled, "Account is deactivated"));
    }

    let token = state.jwt.generate_access_token(&record.user)?;
    info!(user_id = %record.user.id, role = %record.user.role, "User logged in");

    let users = state.db.users();
    let user_id = record.user.id.clone();
    tokio::spawn(async move {
        if let Err(e) = users.touch_last_login(&user_id, Utc::now()).await {
            warn!(user_id = %user_id, error = %e, "Failed to record last login");
        }
    });

    Ok(ApiResponse::with_message(
        AuthSession {
            token,
            user: record.user,
        },
        "Login successful",
    ))
}

/// Self-service sign-up. Always creates a plain `user`.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<ApiResponse<AuthSession>> {
    let new_user = NewUser::new(
        &body.first_name,
        &body.last_name,
        &body.email,
        Role::User,
        body.department,
    )?;
    validate_password(&body.password)?;

    let hash = hash_password(&body.password)?;
    let user = state.db.users().create(&new_user, &hash).await?;
    let token = state.jwt.generate_access_token(&user)?;

    Ok(ApiResponse::created(
        AuthSession { token, user },
        "Registration successful",
    ))
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Me>> {
    let permissions = state
        .permissions
        .permissions_for_role(user.role)
        .into_iter()
        .collect();
    Ok(ApiResponse::ok(Me { user, permissions }))
}

/// Name and email only. Role and department go through `/users/{id}`.
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ProfilePatch>,
) -> ApiResult<ApiResponse<User>> {
    let updated = state.db.users().update_profile(&user.id, &body).await?;
    Ok(ApiResponse::with_message(updated, "Profile updated"))
}

async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<()>> {
    let record = state.db.users().get_credentials(&user.id).await?;
    if !verify_password(&body.current_password, &record.password_hash) {
        return Err(ApiError::validation("Current password is incorrect"));
    }
    validate_password(&body.new_password)?;

    let hash = hash_password(&body.new_password)?;
    state.db.users().update_password(&user.id, &hash).await?;
    Ok(ApiResponse::with_message((), "Password changed"))
}
