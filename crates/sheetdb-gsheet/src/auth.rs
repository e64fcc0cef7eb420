//! Service-account authentication
//!
//! A service account signs an RS256 JWT assertion and trades it for an access
//! token at the key's `token_uri`. Tokens are cached and refreshed shortly
//! before they expire.

use crate::config::GSheetConfig;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use ring::signature::RsaKeyPair;
use serde::{Deserialize, Serialize};
use sheetdb_common::{Result, SheetDbError};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Scopes requested when none are configured
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are treated as expired this long before their real expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fields of a service-account JSON key file that signing needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| SheetDbError::Auth(format!("invalid service account key: {}", e)))?;
        // Fail at load time rather than on the first request.
        key.key_pair()?;
        Ok(key)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SheetDbError::Auth(format!(
                "cannot read service account file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    fn key_pair(&self) -> Result<RsaKeyPair> {
        let mut reader = std::io::Cursor::new(self.private_key.as_bytes());
        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| SheetDbError::Auth(format!("invalid PEM private key: {}", e)))?;
        match item {
            Some(rustls_pemfile::Item::Pkcs8Key(der)) => RsaKeyPair::from_pkcs8(der.secret_pkcs8_der())
                .map_err(|e| SheetDbError::Auth(format!("rejected pkcs8 key: {}", e))),
            Some(rustls_pemfile::Item::Pkcs1Key(der)) => RsaKeyPair::from_der(der.secret_pkcs1_der())
                .map_err(|e| SheetDbError::Auth(format!("rejected pkcs1 key: {}", e))),
            _ => Err(SheetDbError::Auth("no RSA private key in service account file".to_string())),
        }
    }

    /// Signed JWT assertion for the token endpoint
    pub fn assertion(&self, scopes: &[String], now: DateTime<Utc>) -> Result<String> {
        let scope = scopes.join(" ");
        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.private_key_id.as_deref(),
        };
        let claims = JwtClaims {
            iss: &self.client_email,
            scope: &scope,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
        };

        let header_b64 = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims_b64 = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", header_b64, claims_b64);

        let key_pair = self.key_pair()?;
        let mut signature = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| SheetDbError::Auth("failed to sign JWT assertion".to_string()))?;

        Ok(format!(
            "{}.{}",
            signing_input,
            BASE64_URL_SAFE_NO_PAD.encode(&signature)
        ))
    }
}

/// What the credentials factory hands back
#[derive(Clone)]
pub enum Credentials {
    /// Service account exchanged for short-lived tokens
    ServiceAccount {
        key: ServiceAccountKey,
        scopes: Vec<String>,
    },
    /// Pre-issued bearer token, used as is
    Token(String),
}

impl Credentials {
    /// Service account from a key file; empty `scopes` means the defaults
    pub fn from_service_account_file<I, S>(path: impl AsRef<Path>, scopes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::service_account(ServiceAccountKey::from_file(path)?, scopes))
    }

    pub fn service_account<I, S>(key: ServiceAccountKey, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        if scopes.is_empty() {
            scopes = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        }
        Self::ServiceAccount { key, scopes }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    /// Service account named by `SERVICE_ACCOUNT_FILE`
    pub fn from_config(config: &GSheetConfig) -> Result<Self> {
        let path = config.service_account_file.as_ref().ok_or_else(|| {
            SheetDbError::Config("SERVICE_ACCOUNT_FILE is not set".to_string())
        })?;
        Self::from_service_account_file(path, config.scopes.iter().cloned())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount { key, scopes } => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .field("scopes", scopes)
                .finish(),
            Self::Token(_) => f.write_str("Token(..)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Hands out access tokens for one set of credentials
pub struct Authenticator {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
    refresh: tokio::sync::Mutex<()>,
}

impl Authenticator {
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            credentials,
            http,
            cached: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Current access token, exchanging a new assertion when needed
    ///
    /// Concurrent callers share a single exchange.
    pub async fn token(&self) -> Result<String> {
        let (key, scopes) = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::ServiceAccount { key, scopes } => (key, scopes),
        };

        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }
        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let token = self.exchange(key, scopes).await?;
        let value = token.value.clone();
        *self.cached.lock() = Some(token);
        Ok(value)
    }

    /// Forget the cached token, e.g. after the API rejected it
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    fn fresh_token(&self) -> Option<String> {
        let cached = self.cached.lock();
        cached
            .as_ref()
            .filter(|t| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < t.expires_at)
            .map(|t| t.value.clone())
    }

    async fn exchange(&self, key: &ServiceAccountKey, scopes: &[String]) -> Result<CachedToken> {
        let now = Utc::now();
        let assertion = key.assertion(scopes, now)?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let response = self.http.post(&key.token_uri).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetDbError::Auth(format!(
                "token exchange failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetDbError::Auth(format!("invalid token response: {}", e)))?;
        debug!(
            client_email = %key.client_email,
            expires_in = token.expires_in,
            "Obtained access token"
        );
        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
