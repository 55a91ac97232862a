//! # HTTP Handlers
//!
//! One module per resource, each exposing `routes()`.
//!
//! ## Handler Pattern
//! ```rust,ignore
//! async fn delete_vendor(
//!     State(state): State<AppState>,
//!     CurrentUser(user): CurrentUser,   // set by require_auth
//!     Path(id): Path<String>,
//! ) -> ApiResult<ApiResponse<()>> {
//!     policy::require(&state, &user, &policy::MANAGE_VENDORS)?;   // 403
//!     state.db.vendors().delete(&id).await?;                      // DbError → ApiError
//!     Ok(ApiResponse::with_message((), "Vendor deleted"))
//! }
//! ```

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use tally_core::report::DateRange;

use crate::error::{ApiError, ApiResult};

pub mod auth;
pub mod cart;
pub mod dashboard;
pub mod health;
pub mod orders;
pub mod products;
pub mod purchases;
pub mod reports;
pub mod users;
pub mod vendors;

// =============================================================================
// Query Helpers
// =============================================================================

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD`. A bare date means
/// the start of that day for lower bounds and its last millisecond for upper
/// bounds.
pub(crate) fn parse_instant(field: &str, raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    let invalid =
        || ApiError::validation(format!("{field} must be a date (YYYY-MM-DD) or an RFC 3339 timestamp"));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let naive = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn parse_bounds(
    from: Option<&str>,
    to: Option<&str>,
) -> ApiResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let from = from.map(|raw| parse_instant("from", raw, false)).transpose()?;
    let to = to.map(|raw| parse_instant("to", raw, true)).transpose()?;
    Ok((from, to))
}

/// A range with per-bound fallbacks.
pub(crate) fn range_or(
    from: Option<&str>,
    to: Option<&str>,
    default_from: DateTime<Utc>,
    default_to: DateTime<Utc>,
) -> ApiResult<DateRange> {
    let (from, to) = parse_bounds(from, to)?;
    Ok(DateRange::new(
        from.unwrap_or(default_from),
        to.unwrap_or(default_to),
    )?)
}

/// `None` when neither bound is given. A single bound is open on the other
/// side.
pub(crate) fn optional_range(from: Option<&str>, to: Option<&str>) -> ApiResult<Option<DateRange>> {
    if from.is_none() && to.is_none() {
        return Ok(None);
    }
    range_or(from, to, DateTime::UNIX_EPOCH, Utc::now()).map(Some)
}

/// First instant of the month `now` falls in.
pub(crate) fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive));
    first.unwrap_or(now)
}

/// Today from midnight to its last millisecond, UTC.
pub(crate) fn today(now: DateTime<Utc>) -> ApiResult<DateRange> {
    let day = now.date_naive().format("%Y-%m-%d").to_string();
    range_or(Some(&day), Some(&day), now, now)
}
