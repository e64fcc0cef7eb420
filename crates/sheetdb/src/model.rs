//! Model trait and column declarations

use serde::{de::DeserializeOwned, Serialize};
use sheetdb_validation::{ColumnType, ValidationResult};

/// Core trait for records stored in a worksheet
///
/// Implementing types must be Serialize + DeserializeOwned: rows are decoded
/// by coercing cells per [`Column`] and handing the result to serde.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Product {
///     id: i64,
///     name: String,
///     price: f64,
/// }
///
/// impl SheetModel for Product {
///     fn sheet_name() -> &'static str {
///         "Products"
///     }
///
///     fn columns() -> Vec<Column> {
///         vec![
///             Column::new("id", ColumnType::int()).header("Product ID"),
///             Column::new("name", ColumnType::string()).header("Product Name"),
///             Column::new("price", ColumnType::float()).header("Price"),
///         ]
///     }
/// }
/// ```
pub trait SheetModel: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// Worksheet (tab) holding this model's rows
    fn sheet_name() -> &'static str;

    /// Field-to-header mapping, in the column order used when the sheet is
    /// created
    fn columns() -> Vec<Column>;

    /// Fields that must be unique across the sheet
    ///
    /// Empty by default, which disables the duplicate check on insert.
    fn key_fields() -> &'static [&'static str] {
        &[]
    }

    /// Model-level validation, run after field typing on both read and write
    fn validate(&self) -> ValidationResult<()> {
        Ok(())
    }
}

/// One model field and the spreadsheet column it lives in
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub field: String,
    pub header: String,
    pub column_type: ColumnType,
}

impl Column {
    /// Column whose header is the field name itself
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        let field = field.into();
        Self {
            header: field.clone(),
            field,
            column_type,
        }
    }

    /// Use a different header in the sheet
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults_to_field() {
        let col = Column::new("email", ColumnType::Email);
        assert_eq!(col.field, "email");
        assert_eq!(col.header, "email");
    }

    #[test]
    fn test_header_override() {
        let col = Column::new("email", ColumnType::Email).header("Email Address");
        assert_eq!(col.field, "email");
        assert_eq!(col.header, "Email Address");
        assert_eq!(col.column_type, ColumnType::Email);
    }
}
