//! Validation error types

use std::fmt;

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Every field failure found while encoding or decoding one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Shorthand for a collection holding a single error
    pub fn single(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// Ok if nothing was collected
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn as_slice(&self) -> &[ValidationError] {
        &self.errors
    }

    /// True if any error was raised for `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no validation errors");
        }
        let parts: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self::single(error)
    }
}

/// A single field failure
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Model field name (or the raw header when the column is unmapped)
    pub field: String,
    pub message: String,
    pub error_type: ErrorType,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            error_type,
        }
    }

    pub fn type_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, ErrorType::TypeError)
    }

    pub fn value_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, ErrorType::ValueError)
    }

    pub fn format_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, ErrorType::FormatError)
    }

    pub fn missing_error(field: impl Into<String>) -> Self {
        Self::new(field, "Field required", ErrorType::Missing)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.field, self.message, self.error_type)
    }
}

/// Classification of validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Expected one kind of value, got another
    TypeError,
    /// Right kind, out of bounds
    ValueError,
    /// Required field missing
    Missing,
    /// Malformed email, url, uuid, date...
    FormatError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError => write!(f, "type_error"),
            Self::ValueError => write!(f, "value_error"),
            Self::Missing => write!(f, "missing"),
            Self::FormatError => write!(f, "format_error"),
        }
    }
}
