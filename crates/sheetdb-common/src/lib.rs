//! Common utilities for sheetdb
//!
//! Shared by the core crate and every store implementation.

pub mod error;

pub use error::{Result, SheetDbError};
pub use sheetdb_validation::{ValidationError, ValidationErrors};
