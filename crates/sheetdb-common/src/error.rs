//! Error types for sheetdb

use sheetdb_validation::{ValidationError, ValidationErrors};
use thiserror::Error;

/// Result type alias for sheetdb operations
pub type Result<T> = std::result::Result<T, SheetDbError>;

/// Unified error type for all sheetdb operations
#[derive(Error, Debug, Clone)]
pub enum SheetDbError {
    /// No record matched the filter
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record failed column typing or model validation
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// A record with the same key fields already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The sheet exists but cannot be read or written (permissions, bad range)
    #[error("Sheet access error: {0}")]
    SheetAccess(String),

    /// The worksheet does not exist and was not allowed to be created
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Credentials could not be loaded or exchanged for a token
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-success response from the spreadsheet service
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Could not reach the spreadsheet service - retryable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SheetDbError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            SheetDbError::NotFound(_) => "not_found",
            SheetDbError::Validation(_) => "validation_error",
            SheetDbError::Conflict(_) => "conflict_error",
            SheetDbError::SheetAccess(_) => "sheet_access_error",
            SheetDbError::SheetNotFound(_) => "sheet_not_found",
            SheetDbError::Auth(_) => "auth_error",
            SheetDbError::Http { .. } => "http_error",
            SheetDbError::Connection(_) => "connection_error",
            SheetDbError::Timeout(_) => "timeout",
            SheetDbError::Transient(_) => "transient_error",
            SheetDbError::Io(_) => "io_error",
            SheetDbError::Serialization(_) => "serialization_error",
            SheetDbError::Config(_) => "config_error",
            SheetDbError::Internal(_) => "internal_error",
        }
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SheetDbError::Connection(_)
            | SheetDbError::Timeout(_)
            | SheetDbError::Transient(_) => true,
            SheetDbError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns true if the caller asked for something that is not there
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SheetDbError::NotFound(_) | SheetDbError::SheetNotFound(_)
        )
    }

    /// Validation failure for a single field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        SheetDbError::Validation(ValidationErrors::single(ValidationError::value_error(
            field, message,
        )))
    }

    /// Field-level errors when this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            SheetDbError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for SheetDbError {
    fn from(err: ValidationErrors) -> Self {
        SheetDbError::Validation(err)
    }
}

impl From<ValidationError> for SheetDbError {
    fn from(err: ValidationError) -> Self {
        SheetDbError::Validation(err.into())
    }
}

impl From<serde_json::Error> for SheetDbError {
    fn from(err: serde_json::Error) -> Self {
        SheetDbError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SheetDbError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => SheetDbError::SheetAccess(err.to_string()),
            std::io::ErrorKind::TimedOut => SheetDbError::Timeout(err.to_string()),
            _ => SheetDbError::Io(err.to_string()),
        }
    }
}

// CSV-specific error conversions (when csv-errors feature is enabled)
#[cfg(feature = "csv-errors")]
impl From<csv::Error> for SheetDbError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            SheetDbError::Io(err.to_string())
        } else {
            SheetDbError::Serialization(format!("CSV error: {}", err))
        }
    }
}

// Workbook-specific error conversions (when excel-errors feature is enabled)
#[cfg(feature = "excel-errors")]
impl From<calamine::XlsxError> for SheetDbError {
    fn from(err: calamine::XlsxError) -> Self {
        match err {
            calamine::XlsxError::Io(e) => e.into(),
            other => SheetDbError::Serialization(format!("XLSX error: {}", other)),
        }
    }
}

#[cfg(feature = "excel-errors")]
impl From<zip::result::ZipError> for SheetDbError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => e.into(),
            other => SheetDbError::Serialization(format!("ZIP error: {}", other)),
        }
    }
}

// HTTP-specific error conversions (when http-errors feature is enabled)
#[cfg(feature = "http-errors")]
impl From<reqwest::Error> for SheetDbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SheetDbError::Timeout(err.to_string())
        } else if err.is_connect() {
            SheetDbError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            SheetDbError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SheetDbError::Serialization(err.to_string())
        } else {
            SheetDbError::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = SheetDbError::NotFound("no user with email=x".to_string());
        assert_eq!(err.to_string(), "Not found: no user with email=x");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_error_display_validation() {
        let err = SheetDbError::invalid_field("price", "must be positive");
        assert_eq!(
            err.to_string(),
            "Validation error: price: must be positive [value_error]"
        );
        assert_eq!(err.code(), "validation_error");
        assert!(err.validation_errors().unwrap().has_field("price"));
    }

    #[test]
    fn test_error_display_conflict() {
        let err = SheetDbError::Conflict("id=1 already exists".to_string());
        assert_eq!(err.to_string(), "Conflict: id=1 already exists");
        assert_eq!(err.code(), "conflict_error");
    }

    #[test]
    fn test_error_display_http() {
        let err = SheetDbError::Http {
            status: 400,
            message: "Unable to parse range".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 400: Unable to parse range");
        assert_eq!(err.code(), "http_error");
    }

    #[test]
    fn test_error_codes_sheet_access() {
        assert_eq!(
            SheetDbError::SheetAccess("forbidden".into()).code(),
            "sheet_access_error"
        );
        assert_eq!(
            SheetDbError::SheetNotFound("Users".into()).code(),
            "sheet_not_found"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: SheetDbError = json_err.into();
        assert!(matches!(err, SheetDbError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(SheetDbError::from(denied), SheetDbError::SheetAccess(_)));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(matches!(SheetDbError::from(other), SheetDbError::Io(_)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(SheetDbError::Timeout("t".into()).is_retryable());
        assert!(SheetDbError::Connection("c".into()).is_retryable());
        assert!(SheetDbError::Transient("t".into()).is_retryable());
        assert!(SheetDbError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(SheetDbError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(!SheetDbError::Http { status: 400, message: String::new() }.is_retryable());
        assert!(!SheetDbError::NotFound("x".into()).is_retryable());
        assert!(!SheetDbError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn test_is_not_found() {
        assert!(SheetDbError::NotFound("x".into()).is_not_found());
        assert!(SheetDbError::SheetNotFound("x".into()).is_not_found());
        assert!(!SheetDbError::Auth("x".into()).is_not_found());
    }
}
