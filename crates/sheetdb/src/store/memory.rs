//! In-process store

use super::{check_data_row, set_header_row, SheetStore};
use crate::mapping::Schema;
use async_trait::async_trait;
use parking_lot::Mutex;
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::CellValue;
use std::collections::BTreeMap;
use tracing::info;

/// Sheets held in memory
///
/// Same semantics as the file and remote stores; nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: Mutex<BTreeMap<String, Vec<Vec<CellValue>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a sheet wholesale (header row first)
    pub fn with_sheet(self, sheet: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        self.sheets.lock().insert(sheet.into(), rows);
        self
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.lock().keys().cloned().collect()
    }

    /// Snapshot of a sheet's rows
    pub fn rows(&self, sheet: &str) -> Option<Vec<Vec<CellValue>>> {
        self.sheets.lock().get(sheet).cloned()
    }
}

fn not_found(sheet: &str) -> SheetDbError {
    SheetDbError::SheetNotFound(format!("Sheet '{}' not found", sheet))
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn ensure_sheet(&self, sheet: &str, headers: &[String]) -> Result<Vec<String>> {
        let mut sheets = self.sheets.lock();
        let header_row = headers.iter().map(|h| CellValue::Text(h.clone())).collect();
        if let Some(rows) = sheets.get_mut(sheet) {
            let existing = rows.first().map(|r| Schema::header_names(r)).unwrap_or_default();
            if existing.is_empty() {
                set_header_row(rows, header_row);
                info!(sheet, ?headers, "Wrote headers into empty worksheet");
                return Ok(headers.to_vec());
            }
            return Ok(existing);
        }
        sheets.insert(sheet.to_string(), vec![header_row]);
        info!(sheet, ?headers, "Created new worksheet");
        Ok(headers.to_vec())
    }

    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        self.sheets
            .lock()
            .get(sheet)
            .cloned()
            .ok_or_else(|| not_found(sheet))
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()> {
        let mut sheets = self.sheets.lock();
        let existing = sheets.get_mut(sheet).ok_or_else(|| not_found(sheet))?;
        existing.extend(rows);
        Ok(())
    }

    async fn update_row(&self, sheet: &str, row_number: usize, cells: Vec<CellValue>) -> Result<()> {
        let mut sheets = self.sheets.lock();
        let rows = sheets.get_mut(sheet).ok_or_else(|| not_found(sheet))?;
        let idx = check_data_row(sheet, row_number, rows.len())?;
        let row = &mut rows[idx];
        // Cells past the written width keep their value, as on a real sheet.
        if row.len() < cells.len() {
            row.resize(cells.len(), CellValue::Empty);
        }
        for (i, cell) in cells.into_iter().enumerate() {
            row[i] = cell;
        }
        Ok(())
    }

    async fn delete_row(&self, sheet: &str, row_number: usize) -> Result<()> {
        let mut sheets = self.sheets.lock();
        let rows = sheets.get_mut(sheet).ok_or_else(|| not_found(sheet))?;
        let idx = check_data_row(sheet, row_number, rows.len())?;
        rows.remove(idx);
        Ok(())
    }

    async fn clear_rows(&self, sheet: &str) -> Result<usize> {
        let mut sheets = self.sheets.lock();
        let rows = sheets.get_mut(sheet).ok_or_else(|| not_found(sheet))?;
        let cleared = rows.len().saturating_sub(1);
        rows.truncate(1);
        Ok(cleared)
    }
}
