//! Sheets v4 REST client with retries
//!
//! Thin wrapper over the handful of endpoints the store needs. Every call goes
//! through [`SheetsClient::send`], which attaches the bearer token, retries
//! transient failures with backoff and maps error statuses onto
//! [`SheetDbError`].

use crate::auth::{Authenticator, Credentials};
use crate::config::HttpConfig;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sheetdb_common::{Result, SheetDbError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Produces credentials on first use
pub type CredentialsFactory = Box<dyn Fn() -> Result<Credentials> + Send + Sync>;

/// Rows created with every new worksheet
pub const NEW_SHEET_ROWS: usize = 100;

/// Worksheet metadata
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Client for one spreadsheet
#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<SheetsClientInner>,
}

struct SheetsClientInner {
    http: reqwest::Client,
    config: HttpConfig,
    base_url: Url,
    spreadsheet_id: String,
    credentials: CredentialsFactory,
    auth: OnceCell<Authenticator>,
}

impl SheetsClient {
    /// Create a client; `credentials` is not called until the first request
    pub fn new<F>(credentials: F, spreadsheet_id: impl Into<String>, config: HttpConfig) -> Result<Self>
    where
        F: Fn() -> Result<Credentials> + Send + Sync + 'static,
    {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SheetDbError::Config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        Ok(Self {
            inner: Arc::new(SheetsClientInner {
                http,
                config,
                base_url,
                spreadsheet_id: spreadsheet_id.into(),
                credentials: Box::new(credentials),
                auth: OnceCell::new(),
            }),
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.inner.spreadsheet_id
    }

    pub fn config(&self) -> &HttpConfig {
        &self.inner.config
    }

    async fn authenticator(&self) -> Result<&Authenticator> {
        self.inner
            .auth
            .get_or_try_init(|| async {
                let credentials = (self.inner.credentials)()?;
                debug!(?credentials, "Loaded credentials");
                Ok(Authenticator::new(credentials, self.inner.http.clone()))
            })
            .await
    }

    /// `{base}/{spreadsheet_id}{id_suffix}/{path...}?{query}`
    fn url(&self, id_suffix: &str, path: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SheetDbError::Config(format!("base URL cannot be a base: {}", self.inner.base_url))
            })?;
            segments.pop_if_empty();
            segments.push(&format!("{}{}", self.inner.spreadsheet_id, id_suffix));
            for segment in path {
                segments.push(segment);
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send one API request, retrying per the retry config
    ///
    /// A 401 drops the cached token and is retried once with a fresh one.
    pub async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let retry = &self.inner.config.retry;
        let mut attempt: u32 = 0;
        let mut reauthenticated = false;

        loop {
            let error = match self.execute(method.clone(), url.clone(), body).await {
                Ok(response) if response.status().is_success() => {
                    if attempt > 0 {
                        info!(attempt, "Request succeeded after retry");
                    }
                    return read_json(response).await;
                }
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED && !reauthenticated => {
                    reauthenticated = true;
                    debug!("Access token rejected, refreshing");
                    self.authenticator().await?.invalidate();
                    continue;
                }
                Ok(response) => status_error(response).await,
                Err(e) => e,
            };

            if attempt >= retry.max_retries || !retry.should_retry(&error) {
                return Err(error);
            }
            let delay = retry.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_retries = retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Sheets request failed, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Response> {
        let token = self.authenticator().await?.token().await?;
        let mut request = self.inner.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Every worksheet of the spreadsheet
    #[instrument(skip(self), fields(spreadsheet = %self.inner.spreadsheet_id))]
    pub async fn sheet_properties(&self) -> Result<Vec<SheetProperties>> {
        let url = self.url("", &[], &[("fields", "sheets.properties")])?;
        let meta: SpreadsheetMeta = serde_json::from_value(self.send(Method::GET, url, None).await?)?;
        Ok(meta.sheets.into_iter().map(|s| s.properties).collect())
    }

    /// Add a worksheet sized for `column_count` columns
    #[instrument(skip(self), fields(spreadsheet = %self.inner.spreadsheet_id))]
    pub async fn add_sheet(&self, title: &str, column_count: usize) -> Result<SheetProperties> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": column_count.max(1),
                        }
                    }
                }
            }]
        });
        let reply = self.batch_update(&body).await?;
        let properties = reply
            .pointer("/replies/0/addSheet/properties")
            .cloned()
            .ok_or_else(|| {
                SheetDbError::Serialization("addSheet reply has no sheet properties".to_string())
            })?;
        Ok(serde_json::from_value(properties)?)
    }

    /// Remove one 1-based row and shift the rest up
    #[instrument(skip(self), fields(spreadsheet = %self.inner.spreadsheet_id))]
    pub async fn delete_row(&self, sheet_id: i64, row_number: usize) -> Result<()> {
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_number.saturating_sub(1),
                        "endIndex": row_number,
                    }
                }
            }]
        });
        self.batch_update(&body).await.map(|_| ())
    }

    async fn batch_update(&self, body: &Value) -> Result<Value> {
        let url = self.url(":batchUpdate", &[], &[])?;
        self.send(Method::POST, url, Some(body)).await
    }

    /// Raw cell values of `range`; dates stay formatted strings
    pub async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.url(
            "",
            &["values", range],
            &[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "FORMATTED_STRING"),
            ],
        )?;
        let values: ValueRange = serde_json::from_value(self.send(Method::GET, url, None).await?)?;
        Ok(values.values)
    }

    /// Append rows after the table found at `range`
    pub async fn append_values(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let url = self.url(
            "",
            &["values", &format!("{}:append", range)],
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send(Method::POST, url, Some(&body)).await.map(|_| ())
    }

    /// Overwrite `range` with `rows`
    pub async fn update_values(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let url = self.url("", &["values", range], &[("valueInputOption", "RAW")])?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(Method::PUT, url, Some(&body)).await.map(|_| ())
    }

    /// Clear the values (not formatting) of every range
    pub async fn batch_clear(&self, ranges: &[String]) -> Result<()> {
        let url = self.url("", &["values:batchClear"], &[])?;
        let body = json!({ "ranges": ranges });
        self.send(Method::POST, url, Some(&body)).await.map(|_| ())
    }
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("spreadsheet_id", &self.inner.spreadsheet_id)
            .finish()
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Map a non-success response onto the error taxonomy
async fn status_error(response: Response) -> SheetDbError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SheetDbError::SheetAccess(format!("HTTP {}: {}", status.as_u16(), message))
        }
        StatusCode::NOT_FOUND => SheetDbError::SheetNotFound(message),
        _ => SheetDbError::Http {
            status: status.as_u16(),
            message,
        },
    }
}
