//! # Validation Module
//!
//! Input validation utilities for Tally.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend (React forms)                                       │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: axum extractors (serde)                                      │
//! │  └── Type validation (deserialization, closed enums)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: THIS MODULE (called by the aggregates)                       │
//! │  └── Lengths, ranges, formats                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  ├── UNIQUE constraints (barcode, email, PO number)                    │
//! │  └── CHECK (stock >= 0)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::{DEFAULT_PAGE_SIZE, MAX_ITEM_QUANTITY, MAX_PAGE_SIZE, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required, bounded text field and returns it trimmed.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_required_text;
///
/// assert_eq!(validate_required_text("name", "  Gin  ", 100).unwrap(), "Gin");
/// assert!(validate_required_text("name", "   ", 100).is_err());
/// ```
pub fn validate_required_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates an optional text field. Blank input collapses to `None`.
pub fn validate_optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Validates an email address and returns it lower-cased.
///
/// ## Rules
/// - One `@` with a non-empty local part
/// - A dot somewhere in the domain, not at either end
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let email = validate_required_text("email", email, 254)?.to_lowercase();

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must be a valid email address".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }

    Ok(email)
}

/// Validates a plaintext password before hashing.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    let len = password.chars().count();
    if len < 6 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 6,
        });
    }
    if len > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }
    Ok(())
}

/// Validates a product barcode and returns it trimmed.
///
/// ## Rules
/// - 1 to 64 characters
/// - No internal whitespace
pub fn validate_barcode(barcode: &str) -> ValidationResult<String> {
    let barcode = validate_required_text("barcode", barcode, 64)?;

    if barcode.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }

    Ok(barcode)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price in cents.
///
/// ## Rules
/// - Zero is allowed
/// - Must not exceed MAX_PRICE_CENTS
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_cents;
///
/// assert!(validate_cents("price", 1099).is_ok());
/// assert!(validate_cents("price", 0).is_ok());
/// assert!(validate_cents("price", -100).is_err());
/// assert!(validate_cents("price", i64::MAX).is_err());
/// ```
pub fn validate_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// The error for a computed amount (line total, order total) that does not
/// fit in `i64` cents.
pub fn amount_too_large(field: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "amount is too large".to_string(),
    }
}

/// Validates a restock quantity: any non-negative integer.
pub fn validate_restock_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "stock".to_string(),
        });
    }
    Ok(())
}

/// Validates a vendor rating (1 to 5 stars).
pub fn validate_rating(rating: i64) -> ValidationResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating".to_string(),
            min: 1,
            max: 5,
        });
    }
    Ok(())
}

/// Normalizes `page`/`limit` query values into `(limit, offset)`.
///
/// Missing values fall back to page 1 and [`DEFAULT_PAGE_SIZE`]. A limit
/// above [`MAX_PAGE_SIZE`] is rejected rather than clamped.
pub fn validate_pagination(page: Option<i64>, limit: Option<i64>) -> ValidationResult<(i64, i64)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE,
        });
    }

    Ok((limit, (page - 1) * limit))
}

/// Validates that a date range is not inverted.
pub fn validate_date_range(from: DateTime<Utc>, to: DateTime<Utc>) -> ValidationResult<()> {
    if from > to {
        return Err(ValidationError::InvalidFormat {
            field: "date range".to_string(),
            reason: "start date must not be after end date".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_required_text() {
        assert_eq!(validate_required_text("name", " Rum ", 100).unwrap(), "Rum");
        assert!(validate_required_text("name", "", 100).is_err());
        assert!(validate_required_text("name", &"A".repeat(101), 100).is_err());
    }

    #[test]
    fn test_validate_optional_text() {
        assert_eq!(validate_optional_text("notes", None, 10).unwrap(), None);
        assert_eq!(validate_optional_text("notes", Some("  "), 10).unwrap(), None);
        assert_eq!(
            validate_optional_text("notes", Some(" ok "), 10).unwrap(),
            Some("ok".to_string())
        );
        assert!(validate_optional_text("notes", Some(&"x".repeat(11)), 10).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" Jo@Example.COM ").unwrap(),
            "jo@example.com"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jo@localhost").is_err());
        assert!(validate_email("jo@@example.com").is_err());
        assert!(validate_email("jo@example.").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert_eq!(validate_barcode(" 5000281025155 ").unwrap(), "5000281025155");
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("500 0281").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_cents() {
        assert!(validate_cents("price", 0).is_ok());
        assert!(validate_cents("price", MAX_PRICE_CENTS).is_ok());

        assert!(matches!(
            validate_cents("price", -1),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
        assert!(matches!(
            validate_cents("price", MAX_PRICE_CENTS + 1),
            Err(ValidationError::OutOfRange { max: MAX_PRICE_CENTS, .. })
        ));
        assert_eq!(amount_too_large("total").field(), "total");
    }

    #[test]
    fn test_validate_restock_quantity() {
        assert!(validate_restock_quantity(0).is_ok());
        assert!(validate_restock_quantity(5000).is_ok());
        assert!(validate_restock_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_rating() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_validate_pagination() {
        assert_eq!(validate_pagination(None, None).unwrap(), (10, 0));
        assert_eq!(validate_pagination(Some(3), Some(20)).unwrap(), (20, 40));
        assert!(validate_pagination(Some(0), None).is_err());
        assert!(validate_pagination(None, Some(101)).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        let now = Utc::now();
        assert!(validate_date_range(now, now).is_ok());
        assert!(validate_date_range(now - Duration::days(1), now).is_ok());
        assert!(validate_date_range(now, now - Duration::days(1)).is_err());
    }
}
