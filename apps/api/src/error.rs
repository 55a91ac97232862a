//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  Handler → Result<T, ApiError>                                          │
//! │     │                                                                   │
//! │     ├── DbError::Domain(CoreError) ── business rule ──┐                 │
//! │     ├── DbError::UniqueViolation ──── 409 ────────────┤                 │
//! │     ├── DbError::QueryFailed ──── logged, 500 ────────┤                 │
//! │     └── CoreError::Forbidden ──── 403 ────────────────┤                 │
//! │                                                       ▼                 │
//! │                          { "success": false,                            │
//! │                            "message": "Cart is empty",                  │
//! │                            "code": "EMPTY_CART" }                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal failures never reach the client in detail: they are logged with
//! their cause and rendered as "Internal server error".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_core::{CoreError, ValidationError};
use tally_db::DbError;
use ts_rs::TS;

/// Error returned from handlers.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
///
/// ## Usage in Frontend
/// ```typescript
/// const res = await api.post('/cart/add', { productId, quantity });
/// if (!res.success) {
///   switch (res.code) {
///     case 'INSUFFICIENT_STOCK':
///       toast(res.message);
///       break;
///     case 'UNAUTHENTICATED':
///       logout();
///       break;
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Not enough stock for the requested quantity (400)
    InsufficientStock,

    /// Checkout of an empty cart (400)
    EmptyCart,

    /// Operation not allowed in the current state (400)
    InvalidState,

    /// Status change the lifecycle does not allow (400)
    InvalidTransition,

    /// Missing, invalid or expired credential (401)
    Unauthenticated,

    /// Valid credential for a deactivated account (401)
    AccountDisabled,

    /// Authenticated but not allowed (403)
    Forbidden,

    /// Resource not found (404)
    NotFound,

    /// Unique field already taken, or a concurrent write won (409)
    Conflict,

    /// Internal server error (500)
    InternalError,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InsufficientStock
            | ErrorCode::EmptyCart
            | ErrorCode::InvalidState
            | ErrorCode::InvalidTransition => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated | ErrorCode::AccountDisabled => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, message)
    }

    /// Logs `cause` and hides it from the client.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Internal error");
        ApiError::new(ErrorCode::InternalError, "Internal server error")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::EmptyCart => ErrorCode::EmptyCart,
            CoreError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            CoreError::InvalidState { .. } => ErrorCode::InvalidState,
            CoreError::Forbidden(_) => ErrorCode::Forbidden,
            CoreError::Conflict { .. } => ErrorCode::Conflict,
            CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::Validation(_) => ErrorCode::ValidationError,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => core.into(),
            DbError::NotFound { entity, id } => {
                ApiError::new(ErrorCode::NotFound, format!("{entity} not found: {id}"))
            }
            DbError::UniqueViolation { field } => {
                ApiError::new(ErrorCode::Conflict, format!("{field} already exists"))
            }
            DbError::TransactionFailed(reason) => {
                tracing::warn!(%reason, "Write lost a race");
                ApiError::new(
                    ErrorCode::Conflict,
                    "The record changed while saving, please retry",
                )
            }
            other => ApiError::internal(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    code: ErrorCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: &self.message,
            code: self.code,
        };
        (self.code.status(), Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_codes() {
        let cases = [
            (CoreError::EmptyCart, StatusCode::BAD_REQUEST),
            (CoreError::not_found("Product", "p1"), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("view reports".into()), StatusCode::FORBIDDEN),
            (
                CoreError::Conflict {
                    field: "email",
                    value: "a@b.c".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                CoreError::invalid_state("Purchase", "is not pending"),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).code.status(), status);
        }
    }

    #[test]
    fn test_internal_db_errors_are_hidden() {
        let err = ApiError::from(DbError::QueryFailed("no such table: carts".into()));
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_unique_violation_is_a_conflict() {
        let err = ApiError::from(DbError::duplicate("barcode"));
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::InsufficientStock).unwrap(),
            "\"INSUFFICIENT_STOCK\""
        );
    }
}
