//! Bounds that can be attached to string and numeric columns

use crate::errors::ValidationError;

/// Constraints for string columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    /// Minimum length in characters
    pub min_length: Option<usize>,
    /// Maximum length in characters
    pub max_length: Option<usize>,
}

impl StringConstraints {
    pub fn check(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(ValidationError::value_error(
                    field,
                    format!("String should have at least {} characters", min),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(ValidationError::value_error(
                    field,
                    format!("String should have at most {} characters", max),
                ));
            }
        }
        Ok(())
    }
}

/// Inclusive bounds for numeric columns (i64 or f64)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericConstraints<T> {
    pub minimum: Option<T>,
    pub maximum: Option<T>,
}

impl<T> NumericConstraints<T>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    pub fn between(minimum: T, maximum: T) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    pub fn check(&self, field: &str, value: T) -> Result<(), ValidationError> {
        if let Some(min) = self.minimum {
            if value < min {
                return Err(ValidationError::value_error(
                    field,
                    format!("Value should be greater than or equal to {}", min),
                ));
            }
        }
        if let Some(max) = self.maximum {
            if value > max {
                return Err(ValidationError::value_error(
                    field,
                    format!("Value should be less than or equal to {}", max),
                ));
            }
        }
        Ok(())
    }
}
