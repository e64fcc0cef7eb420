//! Row <-> model mapping
//!
//! A [`Schema`] is built from a model's [`Column`] list and does the two
//! conversions the database needs:
//!
//! - `encode`: model -> validated JSON record -> cells in sheet header order
//! - `decode`: header row + data row -> coerced JSON -> model (via serde)

use crate::model::{Column, SheetModel};
use serde_json::{Map, Value};
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::coerce::{cell_to_json, check_record, json_to_cell};
use sheetdb_validation::{CellValue, ColumnType, ValidationError, ValidationErrors};
use std::collections::HashMap;

/// Column lookup for one model type
#[derive(Debug, Clone)]
pub struct Schema {
    sheet_name: String,
    columns: Vec<Column>,
    by_field: HashMap<String, usize>,
    by_header: HashMap<String, usize>,
}

impl Schema {
    pub fn of<M: SheetModel>() -> Self {
        Self::new(M::sheet_name(), M::columns())
    }

    pub fn new(sheet_name: impl Into<String>, columns: Vec<Column>) -> Self {
        let mut by_field = HashMap::with_capacity(columns.len());
        let mut by_header = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            by_field.insert(col.field.clone(), i);
            by_header.insert(col.header.clone(), i);
        }
        Self {
            sheet_name: sheet_name.into(),
            columns,
            by_field,
            by_header,
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Header row used when the sheet has to be created
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header.clone()).collect()
    }

    pub fn column_for_field(&self, field: &str) -> Option<&Column> {
        self.by_field.get(field).map(|&i| &self.columns[i])
    }

    pub fn column_for_header(&self, header: &str) -> Option<&Column> {
        self.by_header.get(header).map(|&i| &self.columns[i])
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.by_field.contains_key(field)
    }

    /// Serialize and validate a model
    ///
    /// Model-level and column-level failures are reported together.
    pub fn encode<M: SheetModel>(&self, model: &M) -> Result<Map<String, Value>> {
        let record = match serde_json::to_value(model)? {
            Value::Object(map) => map,
            other => {
                return Err(SheetDbError::Serialization(format!(
                    "model for sheet '{}' must serialize to an object, got {}",
                    self.sheet_name, other
                )))
            }
        };

        let mut errors = ValidationErrors::new();
        if let Err(e) = model.validate() {
            errors.merge(e);
        }
        let typed = self
            .columns
            .iter()
            .map(|c| (c.field.as_str(), &c.column_type));
        if let Err(e) = check_record(&record, typed) {
            errors.merge(e);
        }
        errors.into_result()?;

        Ok(record)
    }

    /// Lay out a record along the sheet's actual header row
    ///
    /// Headers the model does not know get an empty cell.
    pub fn to_row(&self, record: &Map<String, Value>, headers: &[String]) -> Vec<CellValue> {
        headers
            .iter()
            .map(|header| self.cell_for(record, header).unwrap_or(CellValue::Empty))
            .collect()
    }

    /// Like [`Schema::to_row`], but headers the record has no value for keep
    /// the cell currently in the sheet
    pub fn merge_row(
        &self,
        record: &Map<String, Value>,
        headers: &[String],
        current: &[CellValue],
    ) -> Vec<CellValue> {
        headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.cell_for(record, header)
                    .unwrap_or_else(|| current.get(i).cloned().unwrap_or_default())
            })
            .collect()
    }

    fn cell_for(&self, record: &Map<String, Value>, header: &str) -> Option<CellValue> {
        match self.column_for_header(header) {
            Some(column) => record
                .get(&column.field)
                .map(|value| json_to_cell(value, &column.column_type)),
            None => record.get(header).map(CellValue::from_json),
        }
    }

    /// Build a model from one data row
    pub fn decode<M: SheetModel>(
        &self,
        headers: &[String],
        cells: &[CellValue],
    ) -> std::result::Result<M, ValidationErrors> {
        let mut record = Map::new();
        let mut errors = ValidationErrors::new();
        let empty = CellValue::Empty;

        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let cell = cells.get(i).unwrap_or(&empty);
            match self.column_for_header(header) {
                Some(col) => match cell_to_json(&col.field, cell, &col.column_type) {
                    Ok(value) => {
                        record.insert(col.field.clone(), value);
                    }
                    Err(e) => errors.add(e),
                },
                None => {
                    // Unmapped header: keep it under its own name unless a
                    // mapped column already claimed that key.
                    if !record.contains_key(header) {
                        if let Ok(value) = cell_to_json(header, cell, &ColumnType::Any) {
                            record.insert(header.clone(), value);
                        }
                    }
                }
            }
        }
        errors.into_result()?;

        let model: M = serde_json::from_value(Value::Object(record))
            .map_err(|e| ValidationErrors::single(ValidationError::type_error(self.sheet_name.clone(), e.to_string())))?;
        model.validate()?;
        Ok(model)
    }

    /// Header cells as trimmed strings, trailing blanks dropped
    pub fn header_names(row: &[CellValue]) -> Vec<String> {
        let mut names: Vec<String> = row.iter().map(|c| c.to_string().trim().to_string()).collect();
        while names.last().map(|h| h.is_empty()).unwrap_or(false) {
            names.pop();
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use sheetdb_validation::ErrorType;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Product {
        id: i64,
        name: String,
        price: f64,
        #[serde(default)]
        note: Option<String>,
    }

    impl SheetModel for Product {
        fn sheet_name() -> &'static str {
            "Products"
        }

        fn columns() -> Vec<Column> {
            vec![
                Column::new("id", ColumnType::int()).header("Product ID"),
                Column::new("name", ColumnType::string()).header("Product Name"),
                Column::new("price", ColumnType::float()).header("Price"),
                Column::new("note", ColumnType::Any),
            ]
        }

        fn validate(&self) -> sheetdb_validation::ValidationResult<()> {
            if self.price < 0.0 {
                return Err(ValidationError::value_error("price", "must not be negative").into());
            }
            Ok(())
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn headers() -> Vec<String> {
        vec!["Product ID".into(), "Product Name".into(), "Price".into()]
    }

    #[test]
    fn test_headers_follow_column_order() {
        let schema = Schema::of::<Product>();
        assert_eq!(schema.sheet_name(), "Products");
        assert_eq!(
            schema.headers(),
            vec!["Product ID", "Product Name", "Price", "note"]
        );
    }

    #[test]
    fn test_encode_and_lay_out_along_sheet_headers() {
        let schema = Schema::of::<Product>();
        let p = Product {
            id: 1,
            name: "Laptop".into(),
            price: 999.95,
            note: None,
        };
        let record = schema.encode(&p).unwrap();

        // Sheet has its columns in a different order plus an extra one.
        let sheet_headers = vec![
            "Price".to_string(),
            "Product ID".to_string(),
            "Owner".to_string(),
            "Product Name".to_string(),
        ];
        let row = schema.to_row(&record, &sheet_headers);
        assert_eq!(
            row,
            vec![
                CellValue::Float(999.95),
                CellValue::Int(1),
                CellValue::Empty,
                text("Laptop"),
            ]
        );
    }

    #[test]
    fn test_encode_runs_model_validation() {
        let schema = Schema::of::<Product>();
        let p = Product {
            id: 1,
            name: "Broken".into(),
            price: -1.0,
            note: None,
        };
        let err = schema.encode(&p).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(err.validation_errors().unwrap().has_field("price"));
    }

    #[test]
    fn test_merge_row_keeps_foreign_cells() {
        let schema = Schema::of::<Product>();
        let p = Product {
            id: 3,
            name: "Desk".into(),
            price: 120.0,
            note: None,
        };
        let record = schema.encode(&p).unwrap();
        let sheet_headers = vec![
            "Product ID".to_string(),
            "Warehouse".to_string(),
            "Price".to_string(),
        ];
        let current = vec![text("3"), text("B7"), text("99")];
        assert_eq!(
            schema.merge_row(&record, &sheet_headers, &current),
            vec![CellValue::Int(3), text("B7"), CellValue::Float(120.0)]
        );
    }

    #[test]
    fn test_decode_comma_decimal() {
        let schema = Schema::of::<Product>();
        let p: Product = schema
            .decode(&headers(), &[text("1"), text("Laptop"), text("999,95")])
            .unwrap();
        assert_eq!(p.id, 1);
        assert_eq!(p.price, 999.95);
        assert_eq!(p.note, None);
    }

    #[test]
    fn test_decode_short_row_pads_with_empty() {
        let schema = Schema::of::<Product>();
        let err = schema
            .decode::<Product>(&headers(), &[text("1"), text("Laptop")])
            .unwrap_err();
        // Empty price -> null -> serde rejects the missing f64
        assert_eq!(err.as_slice()[0].error_type, ErrorType::TypeError);
    }

    #[test]
    fn test_decode_reports_bad_cells() {
        let schema = Schema::of::<Product>();
        let err = schema
            .decode::<Product>(&headers(), &[text("one"), text("Laptop"), text("x")])
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.has_field("id"));
        assert!(err.has_field("price"));
    }

    #[test]
    fn test_decode_ignores_unknown_headers() {
        let schema = Schema::of::<Product>();
        let mut hs = headers();
        hs.push("Warehouse".into());
        let p: Product = schema
            .decode(&hs, &[text("2"), text("Mouse"), text("10"), text("B7")])
            .unwrap();
        assert_eq!(p.name, "Mouse");
    }

    #[test]
    fn test_header_names_trims_trailing_blanks() {
        let row = vec![text(" User ID "), text("Email"), CellValue::Empty, text("")];
        assert_eq!(Schema::header_names(&row), vec!["User ID", "Email"]);
    }
}
