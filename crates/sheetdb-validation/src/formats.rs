//! Format checks for text columns
//!
//! Pre-compiled patterns for the string formats a column can declare.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").expect("valid regex"));

// Any version, not only v4: ids in sheets are often pasted from other systems.
static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid regex")
});

/// Validate email format
///
/// ```
/// use sheetdb_validation::formats::validate_email;
///
/// assert!(validate_email("alice@example.com"));
/// assert!(!validate_email("alice"));
/// ```
pub fn validate_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Validate URL format (http/https)
pub fn validate_url(value: &str) -> bool {
    URL_REGEX.is_match(value)
}

pub fn validate_uuid(value: &str) -> bool {
    UUID_REGEX.is_match(value)
}

/// Validate a calendar date (YYYY-MM-DD)
///
/// Unlike a bare pattern check this rejects impossible dates such as
/// `2024-02-30`.
pub fn validate_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Validate a date-time
///
/// Accepts RFC 3339 with an offset, and the offset-less
/// `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` forms spreadsheets produce.
pub fn validate_datetime(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
}
