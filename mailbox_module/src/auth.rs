//! Google OAuth 2.0 token management for the Gmail API.
//!
//! Supports the user OAuth refresh-token flow plus a pre-issued access
//! token escape hatch for environments where the token endpoint is not
//! reachable. Refresh tokens can be resolved per client, falling back to
//! the shared credentials.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Credentials for the Gmail API.
#[derive(Debug, Clone, Default)]
pub struct GmailAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Pre-issued access token; assumed valid for one hour.
    pub access_token: Option<String>,
}

impl GmailAuthConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: env_var_non_empty("GOOGLE_CLIENT_ID"),
            client_secret: env_var_non_empty("GOOGLE_CLIENT_SECRET"),
            refresh_token: env_var_non_empty("GOOGLE_REFRESH_TOKEN"),
            access_token: env_var_non_empty("GOOGLE_ACCESS_TOKEN"),
        }
    }

    /// Load credentials with a per-client refresh token override.
    ///
    /// Looks for `GOOGLE_REFRESH_TOKEN_{CLIENT_ID}` first (client id
    /// uppercased, non-alphanumerics collapsed to underscores), then falls
    /// back to the shared `GOOGLE_REFRESH_TOKEN`.
    pub fn from_env_for_client(client_id: Option<&str>) -> Self {
        let refresh_token = client_id
            .and_then(env_key_fragment)
            .and_then(|fragment| {
                let key = format!("GOOGLE_REFRESH_TOKEN_{fragment}");
                let token = env_var_non_empty(&key);
                if token.is_none() {
                    debug!("no {} set, falling back to GOOGLE_REFRESH_TOKEN", key);
                }
                token
            })
            .or_else(|| env_var_non_empty("GOOGLE_REFRESH_TOKEN"));

        Self {
            client_id: env_var_non_empty("GOOGLE_CLIENT_ID"),
            client_secret: env_var_non_empty("GOOGLE_CLIENT_SECRET"),
            refresh_token,
            access_token: env_var_non_empty("GOOGLE_ACCESS_TOKEN"),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Turn a client id into an env var key fragment: uppercase, runs of
/// non-alphanumerics collapsed to single underscores.
fn env_key_fragment(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut output = String::with_capacity(trimmed.len());
    let mut last_was_underscore = false;
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            output.push(ch.to_ascii_uppercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            output.push('_');
            last_was_underscore = true;
        }
    }
    let normalized = output.trim_matches('_').to_string();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GmailAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("http error: {0}")]
    HttpError(String),
    #[error("json error: {0}")]
    JsonError(String),
}

#[derive(Debug)]
struct GmailAuthInner {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    access_token: Option<String>,
    token_expires_at: Option<Instant>,
}

/// Cached access token shared across clones.
#[derive(Debug, Clone)]
pub struct GmailAuth {
    inner: Arc<RwLock<GmailAuthInner>>,
    http: reqwest::Client,
    token_url: String,
}

impl GmailAuth {
    pub fn new(config: GmailAuthConfig) -> Result<Self, GmailAuthError> {
        Self::with_token_url(config, GOOGLE_TOKEN_URL)
    }

    /// Like [`GmailAuth::new`] but refreshing against a custom token
    /// endpoint. Used by tests.
    pub fn with_token_url(
        config: GmailAuthConfig,
        token_url: impl Into<String>,
    ) -> Result<Self, GmailAuthError> {
        if !config.is_valid() {
            return Err(GmailAuthError::MissingCredentials(
                "either GOOGLE_ACCESS_TOKEN or (GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + GOOGLE_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        let (access_token, token_expires_at) = match &config.access_token {
            Some(token) => (
                Some(token.clone()),
                Some(Instant::now() + Duration::from_secs(3600)),
            ),
            None => (None, None),
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(GmailAuthInner {
                client_id: config.client_id,
                client_secret: config.client_secret,
                refresh_token: config.refresh_token,
                access_token,
                token_expires_at,
            })),
            http: reqwest::Client::new(),
            token_url: token_url.into(),
        })
    }

    pub fn from_env() -> Result<Self, GmailAuthError> {
        Self::new(GmailAuthConfig::from_env())
    }

    /// Get a valid access token, refreshing when it is within 60 seconds
    /// of expiry.
    pub async fn access_token(&self) -> Result<String, GmailAuthError> {
        {
            let inner = self.inner.read().await;
            if let (Some(token), Some(expires_at)) =
                (&inner.access_token, &inner.token_expires_at)
            {
                if *expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.clone());
                }
            }
        }
        self.refresh_access_token().await
    }

    pub async fn refresh_access_token(&self) -> Result<String, GmailAuthError> {
        let (client_id, client_secret, refresh_token) = {
            let inner = self.inner.read().await;
            match (&inner.client_id, &inner.client_secret, &inner.refresh_token) {
                (Some(id), Some(secret), Some(token)) => {
                    (id.clone(), secret.clone(), token.clone())
                }
                _ => {
                    return Err(GmailAuthError::MissingCredentials(
                        "no refresh credentials available".to_string(),
                    ))
                }
            }
        };

        debug!("refreshing Gmail OAuth token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| GmailAuthError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("OAuth token refresh failed: {} - {}", status, body);
            return Err(GmailAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| GmailAuthError::JsonError(e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(token_response.expires_in.max(0) as u64);
        let access_token = token_response.access_token.clone();

        {
            let mut inner = self.inner.write().await;
            inner.access_token = Some(token_response.access_token);
            inner.token_expires_at = Some(expires_at);
        }

        debug!("Gmail OAuth token refreshed");
        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    scope: Option<String>,
}
