//! sheetdb validation
//!
//! Everything that sits between a spreadsheet cell and a typed model field:
//!
//! - [`CellValue`]: what a worksheet actually stores
//! - [`ColumnType`]: what a model column expects, with optional constraints
//! - [`coerce`]: cell -> JSON on read, JSON -> cell on write
//! - [`ValidationErrors`]: every field failure collected for one record
//!
//! Typed decoding itself is left to serde; this crate prepares values so that
//! `serde_json::from_value` sees numbers where the model wants numbers even
//! though the sheet handed us text.
//!
//! # Example
//!
//! ```rust
//! use sheetdb_validation::{CellValue, ColumnType};
//! use sheetdb_validation::coerce::cell_to_json;
//!
//! let price = cell_to_json("price", &CellValue::Text("999,95".into()), &ColumnType::float());
//! assert_eq!(price.unwrap(), serde_json::json!(999.95));
//! ```

pub mod coerce;
pub mod constraints;
pub mod errors;
pub mod formats;
pub mod types;

pub use constraints::{NumericConstraints, StringConstraints};
pub use errors::{ErrorType, ValidationError, ValidationErrors, ValidationResult};
pub use types::{CellValue, ColumnType};
