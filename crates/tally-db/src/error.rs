//! # Persistence Errors
//!
//! ```text
//! sqlx::Error ──────────────┐
//! MigrateError ─────────────┤
//! serde_json::Error ────────┼──► DbError ──► ApiError (tally-api)
//! CoreError (inside a tx) ──┘   (Domain)
//! ```
//!
//! Repositories raise [`DbError::Domain`] when a business rule fails halfway
//! through a transaction. The transaction is dropped, so nothing is written.

use sqlx::error::ErrorKind;
use tally_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// No row for the id, or a `fetch_one` that came back empty.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write. Repositories pre-check the common
    /// cases (barcode, email, PO number); this catches concurrent inserts.
    #[error("{field} is already taken")]
    UniqueViolation { field: String },

    #[error("Referenced row is missing or still in use: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Could not connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Migrations failed: {0}")]
    MigrationFailed(String),

    #[error("Statement failed: {0}")]
    QueryFailed(String),

    /// A compare-and-set update matched no row because another writer got
    /// there first.
    #[error("Concurrent update: {0}")]
    TransactionFailed(String),

    #[error("No database connection available")]
    PoolExhausted,

    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error("Database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
        }
    }
}

/// Column named by a SQLite constraint message such as
/// `UNIQUE constraint failed: products.barcode`.
fn constraint_column(message: &str) -> &str {
    message
        .rsplit(": ")
        .next()
        .and_then(|target| target.split(',').next())
        .map(|target| target.trim().rsplit('.').next().unwrap_or(target))
        .unwrap_or("value")
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "?"),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation => DbError::duplicate(constraint_column(db_err.message())),
                ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                },
                _ => DbError::QueryFailed(db_err.message().to_string()),
            },
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("JSON column: {err}"))
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_pass_through() {
        let err: DbError = CoreError::EmptyCart.into();
        assert!(matches!(err, DbError::Domain(CoreError::EmptyCart)));
        assert_eq!(err.to_string(), CoreError::EmptyCart.to_string());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_constraint_column() {
        assert_eq!(constraint_column("UNIQUE constraint failed: products.barcode"), "barcode");
        assert_eq!(
            constraint_column("UNIQUE constraint failed: cart_items.cart_id, cart_items.product_id"),
            "cart_id"
        );
        assert_eq!(constraint_column("weird"), "weird");
    }
}
