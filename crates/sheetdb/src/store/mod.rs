//! Storage backends
//!
//! A [`SheetStore`] knows nothing about models; it moves rows of
//! [`CellValue`]s in and out of named worksheets. Row numbers are 1-based
//! sheet rows and row 1 is the header row.

use async_trait::async_trait;
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::CellValue;

pub mod memory;

#[cfg(feature = "csv")]
pub mod csv;

#[cfg(feature = "excel")]
pub mod excel;

#[cfg(feature = "excel")]
mod xlsx;

pub use memory::MemoryStore;

#[cfg(feature = "csv")]
pub use self::csv::CsvStore;

#[cfg(feature = "excel")]
pub use excel::ExcelStore;

/// Worksheet primitives every backend provides
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Return the sheet's header row, creating the sheet with `headers` if it
    /// does not exist yet
    ///
    /// A sheet that exists with a blank row 1 gets `headers` written there.
    async fn ensure_sheet(&self, sheet: &str, headers: &[String]) -> Result<Vec<String>>;

    /// Every row of the sheet, header row included
    ///
    /// Fails with [`SheetDbError::SheetNotFound`] if the sheet is missing.
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>>;

    /// Append rows after the last used row
    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()>;

    /// Overwrite one row starting at column A
    async fn update_row(&self, sheet: &str, row_number: usize, cells: Vec<CellValue>) -> Result<()>;

    /// Remove one row, shifting the rows below it up
    async fn delete_row(&self, sheet: &str, row_number: usize) -> Result<()>;

    /// Clear every row below the header, returning how many were cleared
    async fn clear_rows(&self, sheet: &str) -> Result<usize>;
}

/// Data rows live at 2..=last; anything else is out of range
pub(crate) fn check_data_row(sheet: &str, row_number: usize, row_count: usize) -> Result<usize> {
    if row_number < 2 || row_number > row_count {
        return Err(SheetDbError::SheetAccess(format!(
            "row {} is out of range for sheet '{}' ({} rows)",
            row_number, sheet, row_count
        )));
    }
    Ok(row_number - 1)
}

/// Put `header_row` into row 1 of a sheet whose header row is blank
pub(crate) fn set_header_row(rows: &mut Vec<Vec<CellValue>>, header_row: Vec<CellValue>) {
    match rows.first_mut() {
        Some(first) => *first = header_row,
        None => rows.push(header_row),
    }
}

/// Run blocking file I/O off the async runtime
#[cfg(any(feature = "csv", feature = "excel"))]
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SheetDbError::Internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_data_row() {
        assert_eq!(check_data_row("Users", 2, 3).unwrap(), 1);
        assert_eq!(check_data_row("Users", 3, 3).unwrap(), 2);
        assert!(check_data_row("Users", 1, 3).is_err());
        assert!(check_data_row("Users", 4, 3).is_err());
        assert!(check_data_row("Users", 0, 3).is_err());
    }

    #[test]
    fn test_set_header_row() {
        let header = vec![CellValue::Text("id".into())];
        let mut empty = Vec::new();
        set_header_row(&mut empty, header.clone());
        assert_eq!(empty, vec![header.clone()]);

        let mut blank_first = vec![vec![CellValue::Empty], vec![CellValue::Int(1)]];
        set_header_row(&mut blank_first, header.clone());
        assert_eq!(blank_first, vec![header, vec![CellValue::Int(1)]]);
    }
}
