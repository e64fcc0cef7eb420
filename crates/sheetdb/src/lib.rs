//! Typed records over spreadsheets
//!
//! This crate maps worksheet rows to serde models and offers CRUD-style
//! operations over them. The actual storage is pluggable through
//! [`SheetStore`]:
//!
//! - [`store::MemoryStore`]: in-process, for tests and scratch data
//! - [`store::CsvStore`]: one `;`-delimited CSV file per sheet (feature `csv`)
//! - [`store::ExcelStore`]: one `.xlsx` workbook (feature `excel`)
//! - Google Sheets lives in the `sheetdb-gsheet` crate
//!
//! # Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use sheetdb::{Column, ColumnType, Filter, Query, SheetDb, SheetModel};
//! use sheetdb::store::MemoryStore;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     email: String,
//! }
//!
//! impl SheetModel for User {
//!     fn sheet_name() -> &'static str {
//!         "Users"
//!     }
//!
//!     fn columns() -> Vec<Column> {
//!         vec![
//!             Column::new("id", ColumnType::int()).header("User ID"),
//!             Column::new("name", ColumnType::string()).header("Full Name"),
//!             Column::new("email", ColumnType::Email).header("Email Address"),
//!         ]
//!     }
//! }
//!
//! let db = SheetDb::new(MemoryStore::new());
//! db.insert(&User { id: 1, name: "Alice".into(), email: "alice@example.com".into() }).await?;
//!
//! let alice: User = db.get_one_or_raise(&Filter::by("email", "alice@example.com")).await?;
//! let page: Vec<User> = db.get_all(&Query::new().skip(10).limit(10)).await?;
//! ```

pub mod cache;
pub mod db;
pub mod filter;
pub mod mapping;
pub mod model;
pub mod range;
pub mod store;

pub use cache::HeaderCache;
pub use db::SheetDb;
pub use filter::{Filter, Query};
pub use mapping::Schema;
pub use model::{Column, SheetModel};
pub use store::SheetStore;

pub use sheetdb_common::{Result, SheetDbError};
pub use sheetdb_validation::{
    CellValue, ColumnType, NumericConstraints, StringConstraints, ValidationError,
    ValidationErrors, ValidationResult,
};
