//! CSV directory store
//!
//! Each sheet is a `<sheet>.csv` file in one directory, `;`-delimited with
//! minimal quoting. Every mutation rewrites or appends to the file under an
//! async lock; the file I/O itself runs on the blocking pool.

use super::{blocking, check_data_row, set_header_row, SheetStore};
use crate::mapping::Schema;
use async_trait::async_trait;
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::CellValue;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Field delimiter used for every file
pub const CSV_DELIMITER: u8 = b';';

/// Store backed by a directory of CSV files
#[derive(Debug)]
pub struct CsvStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CsvStore {
    /// Use `dir`, creating it on first write if needed
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `sheet`
    ///
    /// Names that cannot be used as a file name as they are (path separators,
    /// characters Windows rejects, control characters, `.`/`..`, empty) fail
    /// with [`SheetDbError::SheetAccess`].
    pub fn sheet_path(&self, sheet: &str) -> Result<PathBuf> {
        let unsafe_char = sheet.chars().find(|c| {
            matches!(*c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
        });
        if let Some(c) = unsafe_char {
            return Err(SheetDbError::SheetAccess(format!(
                "sheet name '{}' contains {:?}, which is not allowed in a CSV file name",
                sheet.escape_debug(),
                c
            )));
        }
        if sheet.trim().is_empty() || sheet == "." || sheet == ".." {
            return Err(SheetDbError::SheetAccess(format!(
                "sheet name '{}' cannot be used as a CSV file name",
                sheet
            )));
        }
        Ok(self.dir.join(format!("{}.csv", sheet)))
    }

    async fn load(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        let path = self.sheet_path(sheet)?;
        let sheet = sheet.to_string();
        blocking(move || {
            if !path.exists() {
                return Err(SheetDbError::SheetNotFound(format!(
                    "Sheet '{}' not found ({})",
                    sheet,
                    path.display()
                )));
            }
            read_file(&path)
        })
        .await
    }

    async fn save(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()> {
        let path = self.sheet_path(sheet)?;
        blocking(move || write_file(&path, &rows)).await
    }
}

fn read_file(path: &Path) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

fn writer_builder() -> ::csv::WriterBuilder {
    let mut builder = ::csv::WriterBuilder::new();
    builder
        .delimiter(CSV_DELIMITER)
        .quote_style(::csv::QuoteStyle::Necessary)
        .flexible(true);
    builder
}

fn write_records<W: std::io::Write>(
    writer: &mut ::csv::Writer<W>,
    rows: &[Vec<CellValue>],
) -> Result<()> {
    for row in rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Replace the file contents, going through a temp file so a failed write
/// leaves the old file in place
fn write_file(path: &Path, rows: &[Vec<CellValue>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = writer_builder().from_path(&tmp)?;
        write_records(&mut writer, rows)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn append_file(path: &Path, rows: &[Vec<CellValue>]) -> Result<()> {
    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    // Files edited by hand often lack the final newline.
    if !ends_with_newline(&mut file)? {
        file.write_all(b"\n")?;
    }
    let mut writer = writer_builder().from_writer(file);
    write_records(&mut writer, rows)
}

/// True for an empty file or one whose last byte is `\n`
fn ends_with_newline(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[async_trait]
impl SheetStore for CsvStore {
    async fn ensure_sheet(&self, sheet: &str, headers: &[String]) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let header_row: Vec<CellValue> = headers.iter().map(|h| CellValue::Text(h.clone())).collect();
        match self.load(sheet).await {
            Ok(mut rows) => {
                let existing = rows.first().map(|r| Schema::header_names(r)).unwrap_or_default();
                if !existing.is_empty() {
                    return Ok(existing);
                }
                set_header_row(&mut rows, header_row);
                self.save(sheet, rows).await?;
                info!(sheet, ?headers, "Wrote headers into empty CSV");
                Ok(headers.to_vec())
            }
            Err(SheetDbError::SheetNotFound(_)) => {
                self.save(sheet, vec![header_row]).await?;
                info!(sheet, ?headers, "Created new CSV with headers");
                Ok(headers.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        let _guard = self.lock.lock().await;
        self.load(sheet).await
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.sheet_path(sheet)?;
        if !path.exists() {
            return Err(SheetDbError::SheetNotFound(format!("Sheet '{}' not found", sheet)));
        }
        blocking(move || append_file(&path, &rows)).await
    }

    async fn update_row(&self, sheet: &str, row_number: usize, cells: Vec<CellValue>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load(sheet).await?;
        let idx = check_data_row(sheet, row_number, rows.len())?;
        let row = &mut rows[idx];
        if row.len() < cells.len() {
            row.resize(cells.len(), CellValue::Empty);
        }
        for (i, cell) in cells.into_iter().enumerate() {
            row[i] = cell;
        }
        self.save(sheet, rows).await
    }

    async fn delete_row(&self, sheet: &str, row_number: usize) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load(sheet).await?;
        let idx = check_data_row(sheet, row_number, rows.len())?;
        rows.remove(idx);
        self.save(sheet, rows).await
    }

    async fn clear_rows(&self, sheet: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut rows = self.load(sheet).await?;
        let cleared = rows.len().saturating_sub(1);
        if cleared > 0 {
            rows.truncate(1);
            self.save(sheet, rows).await?;
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_sheet_path_rejects_unsafe_names() {
        let store = CsvStore::new("/data");
        assert_eq!(store.sheet_path("Users").unwrap(), PathBuf::from("/data/Users.csv"));
        assert_eq!(store.sheet_path("a_b").unwrap(), PathBuf::from("/data/a_b.csv"));
        for name in ["a/b", "a\\b", "c:d", "tab\there", "", "..", "."] {
            let err = store.sheet_path(name).unwrap_err();
            assert_eq!(err.code(), "sheet_access_error", "{:?}", name);
        }
    }

    #[tokio::test]
    async fn test_unsafe_name_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let err = store.ensure_sheet("a/b", &["id".to_string()]).await.unwrap_err();
        assert_eq!(err.code(), "sheet_access_error");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_append_after_missing_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Users.csv"), "User ID;Full Name\n7;Good").unwrap();
        let store = CsvStore::new(dir.path());

        store
            .append_rows("Users", vec![vec![CellValue::Int(8), text("New")]])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("Users.csv")).unwrap();
        assert_eq!(raw, "User ID;Full Name\n7;Good\n8;New\n");
        let rows = store.read_rows("Users").await.unwrap();
        assert_eq!(rows[1], vec![text("7"), text("Good")]);
        assert_eq!(rows[2], vec![text("8"), text("New")]);
    }

    #[tokio::test]
    async fn test_empty_file_gets_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Users.csv"), "").unwrap();
        let store = CsvStore::new(dir.path());
        let headers = vec!["User ID".to_string(), "Full Name".to_string()];

        assert_eq!(store.ensure_sheet("Users", &headers).await.unwrap(), headers);
        store
            .append_rows("Users", vec![vec![CellValue::Int(1), text("Alice")]])
            .await
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("Users.csv")).unwrap();
        assert_eq!(raw, "User ID;Full Name\n1;Alice\n");
    }

    #[tokio::test]
    async fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let headers = vec!["User ID".to_string(), "Full Name".to_string()];
        store.ensure_sheet("Users", &headers).await.unwrap();
        store
            .append_rows(
                "Users",
                vec![
                    vec![CellValue::Int(1), text("Alice; the first")],
                    vec![CellValue::Int(2), CellValue::Empty],
                ],
            )
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("Users.csv")).unwrap();
        assert_eq!(raw, "User ID;Full Name\n1;\"Alice; the first\"\n2;\n");

        let rows = store.read_rows("Users").await.unwrap();
        assert_eq!(rows[1], vec![text("1"), text("Alice; the first")]);
        assert_eq!(rows[2], vec![text("2"), CellValue::Empty]);
    }

    #[tokio::test]
    async fn test_missing_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let err = store.read_rows("Ghost").await.unwrap_err();
        assert_eq!(err.code(), "sheet_not_found");
        assert!(store.append_rows("Ghost", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_update_delete_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        store.ensure_sheet("S", &["id".to_string()]).await.unwrap();
        store
            .append_rows("S", vec![vec![text("1")], vec![text("2")], vec![text("3")]])
            .await
            .unwrap();

        store.update_row("S", 2, vec![text("10")]).await.unwrap();
        store.delete_row("S", 3).await.unwrap();
        let rows = store.read_rows("S").await.unwrap();
        assert_eq!(rows, vec![vec![text("id")], vec![text("10")], vec![text("3")]]);

        assert_eq!(store.clear_rows("S").await.unwrap(), 2);
        assert_eq!(store.read_rows("S").await.unwrap().len(), 1);
    }
}
