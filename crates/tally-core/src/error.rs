//! # Domain Errors
//!
//! [`CoreError`] is what a business rule returns when it refuses. Field-level
//! input problems are [`ValidationError`]s, which convert into
//! `CoreError::Validation` with `?`.
//!
//! ```text
//! ValidationError ─► CoreError ─► DbError::Domain ─► ApiError { code, message }
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is terminal for the current request. Nothing here is
/// retried automatically.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested quantity exceeds live stock.
    ///
    /// ## When This Occurs
    /// - Adding to cart more than is on the shelf
    /// - Checkout after someone else bought the last units
    /// - A negative stock adjustment larger than the stock
    ///
    /// ## User Workflow
    /// ```text
    /// Add to Cart (qty: 12)
    ///      │
    ///      ▼
    /// Check stock: available=10
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Gin 70cl", available: 10, requested: 12 }
    ///      │
    ///      ▼
    /// UI shows: "Only 10 Gin 70cl in stock"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Checkout was attempted on an absent or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// A status change that the lifecycle table does not allow.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The operation is not permitted in the entity's current state.
    ///
    /// ## When This Occurs
    /// - Deleting a purchase that is no longer pending
    /// - Editing purchase items after approval
    /// - Deleting a vendor that still has purchases
    #[error("{entity} {reason}")]
    InvalidState { entity: &'static str, reason: String },

    /// Authenticated but lacking the role or permission.
    #[error("Not allowed to {0}")]
    Forbidden(String),

    /// A unique field collides with an existing record.
    #[error("{field} '{value}' already exists")]
    Conflict { field: &'static str, value: String },

    #[error("A cart holds at most {max} different products")]
    CartTooLarge { max: usize },

    #[error("Quantity {requested} is over the per-line limit of {max}")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for [`CoreError::InvalidState`].
    pub fn invalid_state(entity: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidState {
            entity,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Rejected input. Each variant names the field so the SPA can attach the
/// message to the right input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Inclusive on both ends.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Malformed email, unparseable date, reversed range and the like.
    #[error("{field}: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of {}", allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Name of the field the error refers to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. } => field,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
