//! Client, retry and environment configuration

use crate::auth::DEFAULT_SCOPES;
use sheetdb_common::{Result, SheetDbError};
use std::path::PathBuf;
use std::time::Duration;

/// Default Sheets v4 endpoint
pub const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Configuration for the Sheets HTTP client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Spreadsheets collection URL; the spreadsheet id is appended to it
    pub base_url: String,

    /// Total request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,

    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: SHEETS_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("sheetdb-gsheet/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point at a different endpoint (emulators, tests)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    pub backoff: BackoffStrategy,

    /// HTTP status codes to retry on
    pub retry_on_status: Vec<u16>,

    pub retry_on_timeout: bool,

    pub retry_on_connection_error: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff: BackoffStrategy::Exponential,
            retry_on_status: vec![429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connection_error: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff
            .delay(self.initial_delay, attempt, self.max_delay)
    }

    /// Whether a failed attempt with this error should be retried
    pub fn should_retry(&self, error: &SheetDbError) -> bool {
        match error {
            SheetDbError::Http { status, .. } => self.retry_on_status.contains(status),
            SheetDbError::Timeout(_) => self.retry_on_timeout,
            SheetDbError::Connection(_) => self.retry_on_connection_error,
            SheetDbError::Transient(_) => true,
            _ => false,
        }
    }
}

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Constant delay between retries
    Constant,
    /// Linear increase (delay * attempt)
    Linear,
    /// Exponential increase (delay * 2^attempt)
    Exponential,
}

impl BackoffStrategy {
    /// Calculate delay for given attempt number
    pub fn delay(&self, base: Duration, attempt: u32, max: Duration) -> Duration {
        let delay = match self {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => base.saturating_mul(2u32.saturating_pow(attempt)),
        };
        std::cmp::min(delay, max)
    }
}

/// Connection settings read from the environment
///
/// | variable | meaning |
/// |---|---|
/// | `SERVICE_ACCOUNT_FILE` | path to the service-account JSON key |
/// | `GOOGLE_SCOPES` | comma-separated OAuth scopes (defaults when empty) |
/// | `SPREADSHEET_ID` | target spreadsheet |
#[derive(Debug, Clone, PartialEq)]
pub struct GSheetConfig {
    pub service_account_file: Option<PathBuf>,
    pub scopes: Vec<String>,
    pub spreadsheet_id: String,
}

impl GSheetConfig {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            service_account_file: None,
            scopes: default_scopes(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    pub fn service_account_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.service_account_file = Some(path.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv_loaded(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let spreadsheet_id = lookup("SPREADSHEET_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SheetDbError::Config("SPREADSHEET_ID is not set".to_string()))?;

        let service_account_file = lookup("SERVICE_ACCOUNT_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let scopes = lookup("GOOGLE_SCOPES")
            .map(|raw| parse_scopes(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_scopes);

        Ok(Self {
            service_account_file,
            scopes,
            spreadsheet_id,
        })
    }
}

/// A missing `.env` is fine (the variables may be set directly); one that
/// exists but does not parse is a configuration error
fn dotenv_loaded<T>(result: dotenvy::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SheetDbError::Config(format!("invalid .env file: {}", e))),
    }
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
