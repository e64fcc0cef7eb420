//! Database facade
//!
//! [`SheetDb`] ties a [`SheetStore`] to the model mapping. Reads always fetch
//! the whole sheet, decode every row and filter client-side; mutations that
//! target a record address it by its actual sheet row number.

use crate::cache::HeaderCache;
use crate::filter::{Filter, Query};
use crate::mapping::Schema;
use crate::model::SheetModel;
use crate::store::SheetStore;
use serde_json::{Map, Value};
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::{CellValue, ValidationError, ValidationErrors};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A decoded row and where it lives
struct Found<M> {
    row_number: usize,
    cells: Vec<CellValue>,
    record: Map<String, Value>,
    model: M,
}

struct SheetDbInner<S> {
    store: S,
    headers: HeaderCache,
}

/// Typed CRUD over the worksheets of one store
///
/// Cheap to clone; clones share the store and the header cache.
pub struct SheetDb<S> {
    inner: Arc<SheetDbInner<S>>,
}

impl<S> Clone for SheetDb<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SheetStore> SheetDb<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(SheetDbInner {
                store,
                headers: HeaderCache::new(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn header_cache(&self) -> &HeaderCache {
        &self.inner.headers
    }

    /// Append one record
    #[instrument(skip(self, model), fields(sheet = M::sheet_name()))]
    pub async fn insert<M: SheetModel>(&self, model: &M) -> Result<()> {
        self.insert_many(std::slice::from_ref(model)).await.map(|_| ())
    }

    /// Append several records in one store call
    ///
    /// Every record is validated before anything is written; one invalid
    /// record fails the whole batch.
    #[instrument(skip(self, models), fields(sheet = M::sheet_name(), count = models.len()))]
    pub async fn insert_many<M: SheetModel>(&self, models: &[M]) -> Result<usize> {
        if models.is_empty() {
            return Ok(0);
        }
        let schema = Schema::of::<M>();
        let sheet = schema.sheet_name();

        let records = models
            .iter()
            .map(|m| schema.encode(m))
            .collect::<Result<Vec<_>>>()?;

        let mut headers = self.headers_for(&schema).await?;
        if check_columns(&schema, &headers).is_err() {
            // The cached row may predate a column added to the sheet.
            self.inner.headers.invalidate(sheet);
            headers = self.headers_for(&schema).await?;
            check_columns(&schema, &headers)?;
        }

        if !M::key_fields().is_empty() {
            self.check_unique::<M>(&schema, &records).await?;
        }

        let rows: Vec<Vec<CellValue>> = records
            .iter()
            .map(|r| schema.to_row(r, &headers))
            .collect();
        let count = rows.len();

        match self.inner.store.append_rows(sheet, rows).await {
            Err(SheetDbError::SheetNotFound(_)) => {
                // Sheet removed behind our back: recreate it once.
                debug!(sheet, "Cached headers are stale, recreating sheet");
                self.inner.headers.invalidate(sheet);
                let headers = self.headers_for(&schema).await?;
                check_columns(&schema, &headers)?;
                let rows = records.iter().map(|r| schema.to_row(r, &headers)).collect();
                self.inner.store.append_rows(sheet, rows).await?;
            }
            other => other?,
        }

        info!(affected = count, "Inserted {} row(s) into {}", count, sheet);
        Ok(count)
    }

    /// Matching records in sheet order, sliced by the query's start/limit
    #[instrument(skip(self, query), fields(sheet = M::sheet_name(), filter = %query.get_filter()))]
    pub async fn get_all<M: SheetModel>(&self, query: &Query) -> Result<Vec<M>> {
        let found = self.fetch::<M>().await?;
        let models: Vec<M> = query
            .apply(found, |f| &f.record)
            .into_iter()
            .map(|f| f.model)
            .collect();
        debug!(returned = models.len(), "Fetched records");
        Ok(models)
    }

    /// First matching record, if any
    #[instrument(skip(self, filter), fields(sheet = M::sheet_name(), filter = %filter))]
    pub async fn get_one<M: SheetModel>(&self, filter: &Filter) -> Result<Option<M>> {
        Ok(self.find_first::<M>(filter).await?.map(|f| f.model))
    }

    /// First matching record, or [`SheetDbError::NotFound`]
    pub async fn get_one_or_raise<M: SheetModel>(&self, filter: &Filter) -> Result<M> {
        self.get_one::<M>(filter)
            .await?
            .ok_or_else(|| not_found::<M>(filter))
    }

    /// Number of matching records
    pub async fn count<M: SheetModel>(&self, filter: &Filter) -> Result<usize> {
        Ok(self
            .fetch::<M>()
            .await?
            .iter()
            .filter(|f| filter.matches(&f.record))
            .count())
    }

    /// Apply `changes` (a JSON object of field -> value) to the first match
    ///
    /// The merged record is validated like an insert. Cells under headers the
    /// model does not map are left as they are.
    #[instrument(skip(self, filter, changes), fields(sheet = M::sheet_name(), filter = %filter))]
    pub async fn update<M: SheetModel>(&self, filter: &Filter, changes: Value) -> Result<M> {
        let schema = Schema::of::<M>();
        let sheet = schema.sheet_name();

        let changes = match changes {
            Value::Object(map) => map,
            other => {
                return Err(SheetDbError::invalid_field(
                    "changes",
                    format!("expected an object, got {}", other),
                ))
            }
        };
        let mut errors = ValidationErrors::new();
        for field in changes.keys() {
            if !schema.has_field(field) {
                errors.add(ValidationError::value_error(
                    field.clone(),
                    format!("'{}' has no field '{}'", sheet, field),
                ));
            }
        }
        errors.into_result()?;

        let found = self
            .find_first::<M>(filter)
            .await?
            .ok_or_else(|| not_found::<M>(filter))?;

        let mut merged = found.record;
        merged.extend(changes);
        let model: M = serde_json::from_value(Value::Object(merged)).map_err(|e| {
            SheetDbError::Validation(ValidationErrors::single(ValidationError::type_error(
                sheet,
                e.to_string(),
            )))
        })?;
        let record = schema.encode(&model)?;

        let headers = self.cached_headers(&schema).await?;
        check_columns(&schema, &headers)?;
        let cells = schema.merge_row(&record, &headers, &found.cells);
        self.inner
            .store
            .update_row(sheet, found.row_number, cells)
            .await?;

        info!(row = found.row_number, "Updated row {} in {}", found.row_number, sheet);
        Ok(model)
    }

    /// Remove the first match and return it
    #[instrument(skip(self, filter), fields(sheet = M::sheet_name(), filter = %filter))]
    pub async fn delete<M: SheetModel>(&self, filter: &Filter) -> Result<M> {
        let sheet = M::sheet_name();
        let found = self
            .find_first::<M>(filter)
            .await?
            .ok_or_else(|| not_found::<M>(filter))?;

        self.inner.store.delete_row(sheet, found.row_number).await?;
        info!(row = found.row_number, "Deleted row {} from {}", found.row_number, sheet);
        Ok(found.model)
    }

    /// Clear every data row of the model's sheet, keeping the header row
    #[instrument(skip(self), fields(sheet = M::sheet_name()))]
    pub async fn delete_all<M: SheetModel>(&self) -> Result<usize> {
        let sheet = M::sheet_name();
        let cleared = self.inner.store.clear_rows(sheet).await?;
        info!(affected = cleared, "Cleared {} row(s) from {}", cleared, sheet);
        Ok(cleared)
    }

    /// Header row for inserts: cache first, then the store (creating the
    /// sheet if needed)
    async fn headers_for(&self, schema: &Schema) -> Result<Vec<String>> {
        let sheet = schema.sheet_name();
        if let Some(headers) = self.inner.headers.get(sheet) {
            return Ok(headers);
        }
        let headers = self
            .inner
            .store
            .ensure_sheet(sheet, &schema.headers())
            .await?;
        self.inner.headers.insert(sheet, headers.clone());
        Ok(headers)
    }

    /// Headers seen by the last read, without creating anything
    async fn cached_headers(&self, schema: &Schema) -> Result<Vec<String>> {
        match self.inner.headers.get(schema.sheet_name()) {
            Some(headers) => Ok(headers),
            None => {
                let rows = self.inner.store.read_rows(schema.sheet_name()).await?;
                let headers = rows.first().map(|r| Schema::header_names(r)).unwrap_or_default();
                self.inner.headers.insert(schema.sheet_name(), headers.clone());
                Ok(headers)
            }
        }
    }

    /// Read and decode every data row
    ///
    /// Blank rows are skipped silently, rows that fail to decode with a
    /// warning. The header cache is refreshed from row 1.
    async fn fetch<M: SheetModel>(&self) -> Result<Vec<Found<M>>> {
        let schema = Schema::of::<M>();
        let sheet = schema.sheet_name();
        let rows = self.inner.store.read_rows(sheet).await?;

        let mut rows = rows.into_iter();
        let headers = match rows.next() {
            Some(header_row) => Schema::header_names(&header_row),
            None => return Ok(Vec::new()),
        };
        self.inner.headers.insert(sheet, headers.clone());

        let mut found = Vec::new();
        for (i, cells) in rows.enumerate() {
            let row_number = i + 2;
            if cells.iter().all(CellValue::is_empty) {
                continue;
            }
            match schema.decode::<M>(&headers, &cells) {
                Ok(model) => found.push(Found {
                    row_number,
                    record: record_of(sheet, &model)?,
                    cells,
                    model,
                }),
                Err(errors) => {
                    warn!(sheet, row = row_number, %errors, "Skipping invalid row");
                }
            }
        }
        Ok(found)
    }

    async fn find_first<M: SheetModel>(&self, filter: &Filter) -> Result<Option<Found<M>>> {
        Ok(self
            .fetch::<M>()
            .await?
            .into_iter()
            .find(|f| filter.matches(&f.record)))
    }

    /// Reject records whose key fields collide with a stored row or with an
    /// earlier record of the same batch
    async fn check_unique<M: SheetModel>(
        &self,
        schema: &Schema,
        records: &[Map<String, Value>],
    ) -> Result<()> {
        let existing = match self.fetch::<M>().await {
            Ok(found) => found,
            Err(SheetDbError::SheetNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        for (i, record) in records.iter().enumerate() {
            let key: Filter = M::key_fields()
                .iter()
                .map(|&field| (field, record.get(field).cloned().unwrap_or(Value::Null)))
                .collect();

            if let Some(dup) = existing.iter().find(|f| key.matches(&f.record)) {
                return Err(SheetDbError::Conflict(format!(
                    "'{}' already has a record with {} (row {})",
                    schema.sheet_name(),
                    key,
                    dup.row_number
                )));
            }
            if records[..i].iter().any(|r| key.matches(r)) {
                return Err(SheetDbError::Conflict(format!(
                    "batch for '{}' repeats {}",
                    schema.sheet_name(),
                    key
                )));
            }
        }
        Ok(())
    }
}

/// Every mapped column needs a header to be written under
fn check_columns(schema: &Schema, headers: &[String]) -> Result<()> {
    let missing: Vec<&str> = schema
        .columns()
        .iter()
        .filter(|c| !headers.contains(&c.header))
        .map(|c| c.header.as_str())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(SheetDbError::SheetAccess(format!(
        "sheet '{}' has no column for: {}",
        schema.sheet_name(),
        missing.join(", ")
    )))
}

fn not_found<M: SheetModel>(filter: &Filter) -> SheetDbError {
    SheetDbError::NotFound(format!("No {} record matching {}", M::sheet_name(), filter))
}

/// Serialized form used for filtering and as the base for updates
fn record_of<M: SheetModel>(sheet: &str, model: &M) -> Result<Map<String, Value>> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(SheetDbError::Serialization(format!(
            "model for sheet '{}' must serialize to an object, got {}",
            sheet, other
        ))),
    }
}
