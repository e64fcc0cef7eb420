//! Excel workbook store
//!
//! The whole workbook is read once with calamine and kept in memory. Every
//! mutation is applied to a copy, written back, and only then replaces the
//! in-memory state, so a failed write leaves both the file and the cache
//! untouched.
//!
//! Writing regenerates the worksheet that changed as plain values; formulas
//! and formatting on that sheet are not kept. Every other part of the file
//! (other sheets, styles, shared strings) is copied through unchanged.

use super::xlsx::{save_workbook, Sheets};
use super::{blocking, check_data_row, set_header_row, SheetStore};
use crate::mapping::Schema;
use async_trait::async_trait;
use calamine::{open_workbook, Data, DataType, Range, Reader, Xlsx};
use chrono::NaiveTime;
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::CellValue;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Store backed by a single `.xlsx` file, one worksheet per sheet
#[derive(Debug)]
pub struct ExcelStore {
    path: PathBuf,
    workbook: Mutex<Option<Sheets>>,
}

impl ExcelStore {
    /// Use the workbook at `path`; it is created on the first new sheet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workbook: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the in-memory copy so the next call re-reads the file
    pub async fn reload(&self) {
        *self.workbook.lock().await = None;
    }

    async fn loaded<'a>(&self, slot: &'a mut Option<Sheets>) -> Result<&'a mut Sheets> {
        if slot.is_none() {
            let path = self.path.clone();
            let sheets = blocking(move || read_workbook(&path)).await?;
            debug!(path = %self.path.display(), sheets = sheets.len(), "Loaded workbook");
            *slot = Some(sheets);
        }
        slot.as_mut()
            .ok_or_else(|| SheetDbError::Internal("workbook not loaded".to_string()))
    }

    async fn persist(&self, sheets: Sheets, touched: &str) -> Result<Sheets> {
        let path = self.path.clone();
        let touched = touched.to_string();
        blocking(move || {
            save_workbook(&path, &sheets, &touched)?;
            Ok(sheets)
        })
        .await
    }

    /// Apply `change` to a copy of one sheet's rows and write the workbook
    async fn modify<T, F>(&self, sheet: &str, change: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Vec<CellValue>>) -> Result<T>,
    {
        let mut slot = self.workbook.lock().await;
        let mut sheets = self.loaded(&mut slot).await?.clone();
        let rows = sheets
            .iter_mut()
            .find(|(name, _)| name == sheet)
            .map(|(_, rows)| rows)
            .ok_or_else(|| not_found(sheet))?;
        let out = change(rows)?;
        *slot = Some(self.persist(sheets, sheet).await?);
        Ok(out)
    }
}

fn not_found(sheet: &str) -> SheetDbError {
    SheetDbError::SheetNotFound(format!("Sheet '{}' not found", sheet))
}

/// Every worksheet of the file, or an empty workbook if there is no file yet
fn read_workbook(path: &Path) -> Result<Sheets> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        sheets.push((name, range_rows(&range)));
    }
    Ok(sheets)
}

/// Rows anchored at A1
///
/// calamine ranges start at the first used cell; leading blank rows and
/// columns are restored so row numbers match the sheet.
fn range_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let (row_offset, col_offset) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Vec::new(),
    };

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(to_cell));
        while cells.last().map(|c| *c == CellValue::Empty).unwrap_or(false) {
            cells.pop();
        }
        rows.push(cells);
    }
    rows
}

fn to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(_) => match data.as_datetime() {
            Some(dt) if dt.time() == NaiveTime::MIN => {
                CellValue::Text(dt.format("%Y-%m-%d").to_string())
            }
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Text(data.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

#[async_trait]
impl SheetStore for ExcelStore {
    async fn ensure_sheet(&self, sheet: &str, headers: &[String]) -> Result<Vec<String>> {
        let mut slot = self.workbook.lock().await;
        let current = self.loaded(&mut slot).await?;
        let header_row: Vec<CellValue> = headers.iter().map(|h| CellValue::Text(h.clone())).collect();

        let mut sheets = current.clone();
        match sheets.iter().position(|(name, _)| name == sheet) {
            Some(idx) => {
                let rows = &mut sheets[idx].1;
                let existing = rows.first().map(|r| Schema::header_names(r)).unwrap_or_default();
                if !existing.is_empty() {
                    return Ok(existing);
                }
                set_header_row(rows, header_row);
                *slot = Some(self.persist(sheets, sheet).await?);
                info!(sheet, ?headers, path = %self.path.display(), "Wrote headers into empty worksheet");
            }
            None => {
                sheets.push((sheet.to_string(), vec![header_row]));
                *slot = Some(self.persist(sheets, sheet).await?);
                info!(sheet, ?headers, path = %self.path.display(), "Created new worksheet");
            }
        }
        Ok(headers.to_vec())
    }

    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        let mut slot = self.workbook.lock().await;
        self.loaded(&mut slot)
            .await?
            .iter()
            .find(|(name, _)| name == sheet)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| not_found(sheet))
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()> {
        self.modify(sheet, move |existing| {
            existing.extend(rows);
            Ok(())
        })
        .await
    }

    async fn update_row(&self, sheet: &str, row_number: usize, cells: Vec<CellValue>) -> Result<()> {
        self.modify(sheet, move |rows| {
            let idx = check_data_row(sheet, row_number, rows.len())?;
            let row = &mut rows[idx];
            if row.len() < cells.len() {
                row.resize(cells.len(), CellValue::Empty);
            }
            for (i, cell) in cells.into_iter().enumerate() {
                row[i] = cell;
            }
            Ok(())
        })
        .await
    }

    async fn delete_row(&self, sheet: &str, row_number: usize) -> Result<()> {
        self.modify(sheet, move |rows| {
            let idx = check_data_row(sheet, row_number, rows.len())?;
            rows.remove(idx);
            Ok(())
        })
        .await
    }

    async fn clear_rows(&self, sheet: &str) -> Result<usize> {
        self.modify(sheet, |rows| {
            let cleared = rows.len().saturating_sub(1);
            rows.truncate(1);
            Ok(cleared)
        })
        .await
    }
}
