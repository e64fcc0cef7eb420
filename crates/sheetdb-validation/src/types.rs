//! Cell values and column types

use crate::constraints::{NumericConstraints, StringConstraints};
use std::fmt;

// ============================================================================
// CellValue - what a worksheet stores
// ============================================================================

/// A single worksheet cell
///
/// Remote sheets hand back formatted text; local workbooks keep numbers and
/// booleans typed. Both end up here and go through the same coercion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Empty cells and blank text are both "no value"
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Build a cell from a serialized model field
    ///
    /// Arrays and objects have no cell representation and are stored as JSON
    /// text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// JSON form used on the wire to remote sheets
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Empty => Value::String(String::new()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// ColumnType - what a model column expects
// ============================================================================

/// Declared type of a model column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    String(StringConstraints),
    Int(NumericConstraints<i64>),
    Float(NumericConstraints<f64>),
    Bool,
    Email,
    Url,
    Uuid,
    /// YYYY-MM-DD
    Date,
    /// RFC 3339, or `YYYY-MM-DD HH:MM:SS`
    DateTime,
    /// Nested value kept as JSON text in the cell
    Json,
    /// Passed through untouched
    Any,
}

impl ColumnType {
    pub fn string() -> Self {
        Self::String(StringConstraints::default())
    }

    pub fn int() -> Self {
        Self::Int(NumericConstraints::default())
    }

    pub fn float() -> Self {
        Self::Float(NumericConstraints::default())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool => "boolean",
            Self::Email => "email",
            Self::Url => "url",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Any => "any",
        }
    }
}
