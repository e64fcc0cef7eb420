//! [`SheetStore`] over a Google spreadsheet

use crate::client::SheetsClient;
use crate::range;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sheetdb::{CellValue, Schema, SheetStore};
use sheetdb_common::{Result, SheetDbError};
use std::collections::HashMap;
use tracing::{debug, info};

/// Worksheets of one spreadsheet
///
/// Sheet ids (needed for row deletion) are looked up from the spreadsheet
/// metadata once and cached; a miss refreshes the cache before giving up.
#[derive(Debug)]
pub struct GoogleSheetStore {
    client: SheetsClient,
    sheet_ids: RwLock<HashMap<String, i64>>,
}

impl GoogleSheetStore {
    pub fn new(client: SheetsClient) -> Self {
        Self {
            client,
            sheet_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &SheetsClient {
        &self.client
    }

    /// Worksheet titles, refreshed from the API
    pub async fn sheet_names(&self) -> Result<Vec<String>> {
        self.refresh_sheet_ids().await?;
        let mut names: Vec<String> = self.sheet_ids.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn refresh_sheet_ids(&self) -> Result<()> {
        let properties = self.client.sheet_properties().await?;
        let mut ids = self.sheet_ids.write();
        ids.clear();
        ids.extend(properties.into_iter().map(|p| (p.title, p.sheet_id)));
        Ok(())
    }

    /// Sheet id, or `None` if the spreadsheet has no such worksheet
    async fn find_sheet_id(&self, sheet: &str) -> Result<Option<i64>> {
        let cached = self.sheet_ids.read().get(sheet).copied();
        if cached.is_some() {
            return Ok(cached);
        }
        self.refresh_sheet_ids().await?;
        Ok(self.sheet_ids.read().get(sheet).copied())
    }

    async fn sheet_id(&self, sheet: &str) -> Result<i64> {
        self.find_sheet_id(sheet)
            .await?
            .ok_or_else(|| not_found(sheet))
    }

    /// Read a range, reporting a vanished worksheet as missing
    async fn values(&self, sheet: &str, a1: &str) -> Result<Vec<Vec<CellValue>>> {
        self.sheet_id(sheet).await?;
        match self.client.get_values(a1).await {
            Ok(values) => Ok(values.iter().map(|row| to_cells(row)).collect()),
            // A range naming an unknown sheet fails to parse (400).
            Err(SheetDbError::Http { status: 400, .. }) => {
                self.sheet_ids.write().remove(sheet);
                Err(not_found(sheet))
            }
            Err(e) => Err(e),
        }
    }
}

fn not_found(sheet: &str) -> SheetDbError {
    SheetDbError::SheetNotFound(format!("Sheet '{}' not found", sheet))
}

fn to_cells(row: &[Value]) -> Vec<CellValue> {
    row.iter()
        .map(|v| match v {
            Value::String(s) if s.is_empty() => CellValue::Empty,
            other => CellValue::from_json(other),
        })
        .collect()
}

fn to_values(row: &[CellValue]) -> Vec<Value> {
    row.iter().map(CellValue::to_json).collect()
}

#[async_trait]
impl SheetStore for GoogleSheetStore {
    async fn ensure_sheet(&self, sheet: &str, headers: &[String]) -> Result<Vec<String>> {
        if self.find_sheet_id(sheet).await?.is_some() {
            let rows = self.values(sheet, &range::header_row(sheet)).await?;
            let existing = rows.first().map(|r| Schema::header_names(r)).unwrap_or_default();
            if !existing.is_empty() {
                return Ok(existing);
            }
            let header_row: Vec<Value> = headers.iter().map(|h| Value::String(h.clone())).collect();
            self.client
                .update_values(&range::row(sheet, 1, headers.len()), vec![header_row])
                .await?;
            info!(sheet, ?headers, "Wrote headers into empty worksheet");
            return Ok(headers.to_vec());
        }

        let properties = self.client.add_sheet(sheet, headers.len()).await?;
        self.sheet_ids
            .write()
            .insert(properties.title.clone(), properties.sheet_id);
        let header_row: Vec<Value> = headers.iter().map(|h| Value::String(h.clone())).collect();
        self.client
            .update_values(&range::row(sheet, 1, headers.len()), vec![header_row])
            .await?;
        info!(sheet, ?headers, sheet_id = properties.sheet_id, "Created new worksheet");
        Ok(headers.to_vec())
    }

    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        self.values(sheet, &range::whole_sheet(sheet)).await
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<CellValue>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.sheet_id(sheet).await?;
        let values = rows.iter().map(|r| to_values(r)).collect();
        self.client
            .append_values(&range::append_anchor(sheet), values)
            .await
    }

    async fn update_row(&self, sheet: &str, row_number: usize, cells: Vec<CellValue>) -> Result<()> {
        if row_number < 2 {
            return Err(SheetDbError::SheetAccess(format!(
                "row {} of sheet '{}' is not a data row",
                row_number, sheet
            )));
        }
        let a1 = range::row(sheet, row_number, cells.len());
        self.client.update_values(&a1, vec![to_values(&cells)]).await
    }

    async fn delete_row(&self, sheet: &str, row_number: usize) -> Result<()> {
        if row_number < 2 {
            return Err(SheetDbError::SheetAccess(format!(
                "row {} of sheet '{}' is not a data row",
                row_number, sheet
            )));
        }
        let sheet_id = self.sheet_id(sheet).await?;
        self.client.delete_row(sheet_id, row_number).await
    }

    async fn clear_rows(&self, sheet: &str) -> Result<usize> {
        let rows = self.read_rows(sheet).await?;
        let cleared = rows.len().saturating_sub(1);
        if cleared == 0 {
            return Ok(0);
        }
        let a1 = range::rows(sheet, 2, rows.len());
        debug!(sheet, range = %a1, "Clearing data rows");
        self.client.batch_clear(&[a1]).await?;
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_conversion() {
        let row = vec![json!("1"), json!(""), json!(2.5), json!(true)];
        assert_eq!(
            to_cells(&row),
            vec![
                CellValue::Text("1".into()),
                CellValue::Empty,
                CellValue::Float(2.5),
                CellValue::Bool(true),
            ]
        );
        assert_eq!(
            to_values(&[CellValue::Int(3), CellValue::Empty]),
            vec![json!(3), json!("")]
        );
    }
}
