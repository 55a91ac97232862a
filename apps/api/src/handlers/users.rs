//! User management (manage_users). Accounts are deactivated, never deleted.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};
use tally_core::user::NewUser;
use tally_core::validation::validate_password;
use tally_core::{Department, Page, PageRequest, Role, User};
use tally_db::UserUpdate;
use ts_rs::TS;

use crate::auth::hash_password;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;
use crate::policy::{self, MANAGE_USERS};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    pub department: Option<Department>,
}

/// Absent fields are left alone. `"department": null` clears it.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "present")]
    #[ts(optional)]
    pub department: Option<Option<Department>>,
    pub is_active: Option<bool>,
}

/// Marks a field as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user))
}

async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserListQuery>,
) -> ApiResult<ApiResponse<Page<User>>> {
    policy::require(&state, &user, &MANAGE_USERS)?;
    let request = PageRequest::new(query.page, query.limit)?;
    Ok(ApiResponse::ok(state.db.users().list(request).await?))
}

async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<ApiResponse<User>> {
    policy::require(&state, &user, &MANAGE_USERS)?;
    let new_user = NewUser::new(
        &body.first_name,
        &body.last_name,
        &body.email,
        body.role,
        body.department,
    )?;
    validate_password(&body.password)?;

    let hash = hash_password(&body.password)?;
    let created = state.db.users().create(&new_user, &hash).await?;
    Ok(ApiResponse::created(created, "User created"))
}

async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<User>> {
    policy::require(&state, &user, &MANAGE_USERS)?;
    Ok(ApiResponse::ok(state.db.users().get(&id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult<ApiResponse<User>> {
    policy::require(&state, &user, &MANAGE_USERS)?;
    // No self-demotion or self-deactivation
    if id == user.id && (body.is_active == Some(false) || body.role.is_some_and(|r| r != user.role)) {
        return Err(ApiError::validation(
            "You cannot change your own role or deactivate your own account",
        ));
    }

    let update = UserUpdate {
        role: body.role,
        department: body.department,
        is_active: body.is_active,
    };
    let updated = state.db.users().update(&id, &update).await?;
    Ok(ApiResponse::with_message(updated, "User updated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let absent: UpdateUserRequest = serde_json::from_str(r#"{"isActive":false}"#).unwrap();
        assert_eq!(absent.department, None);

        let cleared: UpdateUserRequest = serde_json::from_str(r#"{"department":null}"#).unwrap();
        assert_eq!(cleared.department, Some(None));

        let set: UpdateUserRequest = serde_json::from_str(r#"{"department":"finance"}"#).unwrap();
        assert_eq!(set.department, Some(Some(Department::Finance)));
    }
}
