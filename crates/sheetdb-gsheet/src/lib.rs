//! Google Sheets backend for sheetdb
//!
//! [`AsyncGoogleSheetDb`] is a [`SheetDb`] over a [`GoogleSheetStore`]. It is
//! built from a credentials factory, which is only called when the first
//! request needs a token.
//!
//! # Example
//!
//! ```ignore
//! use sheetdb::{Filter, Query};
//! use sheetdb_gsheet::{AsyncGoogleSheetDb, Credentials, GSheetConfig};
//!
//! let config = GSheetConfig::from_env()?;
//! let creds = config.clone();
//! let db = AsyncGoogleSheetDb::new(move || Credentials::from_config(&creds), &config.spreadsheet_id)?;
//!
//! db.insert(&user).await?;
//! let users: Vec<User> = db.get_all(&Query::new().limit(10)).await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod range;
pub mod store;

pub use auth::{Authenticator, Credentials, ServiceAccountKey, DEFAULT_SCOPES};
pub use client::{SheetProperties, SheetsClient};
pub use config::{BackoffStrategy, GSheetConfig, HttpConfig, RetryConfig};
pub use store::GoogleSheetStore;

use sheetdb::SheetDb;
use sheetdb_common::Result;
use std::ops::Deref;

/// [`SheetDb`] bound to one Google spreadsheet
///
/// Dereferences to [`SheetDb`], so every CRUD operation is available
/// directly.
#[derive(Clone)]
pub struct AsyncGoogleSheetDb {
    db: SheetDb<GoogleSheetStore>,
}

impl AsyncGoogleSheetDb {
    /// Connect lazily: `credentials` runs on the first request, not here
    pub fn new<F>(credentials: F, spreadsheet_id: impl Into<String>) -> Result<Self>
    where
        F: Fn() -> Result<Credentials> + Send + Sync + 'static,
    {
        Self::with_config(credentials, spreadsheet_id, HttpConfig::default())
    }

    pub fn with_config<F>(
        credentials: F,
        spreadsheet_id: impl Into<String>,
        config: HttpConfig,
    ) -> Result<Self>
    where
        F: Fn() -> Result<Credentials> + Send + Sync + 'static,
    {
        let client = SheetsClient::new(credentials, spreadsheet_id, config)?;
        Ok(Self {
            db: SheetDb::new(GoogleSheetStore::new(client)),
        })
    }

    /// Service account and spreadsheet taken from `SERVICE_ACCOUNT_FILE`,
    /// `GOOGLE_SCOPES` and `SPREADSHEET_ID`
    pub fn from_env() -> Result<Self> {
        let config = GSheetConfig::from_env()?;
        let spreadsheet_id = config.spreadsheet_id.clone();
        Self::new(move || Credentials::from_config(&config), spreadsheet_id)
    }

    pub fn into_inner(self) -> SheetDb<GoogleSheetStore> {
        self.db
    }
}

impl Deref for AsyncGoogleSheetDb {
    type Target = SheetDb<GoogleSheetStore>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
