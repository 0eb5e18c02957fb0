//! Label operations against the mail provider.
//!
//! The [`LabelProvider`] trait is the seam between the provisioning engine
//! and the Gmail REST API; tests substitute scripted implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{GmailAuth, GmailAuthConfig, GmailAuthError};

const DEFAULT_GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("auth error: {0}")]
    Auth(#[from] GmailAuthError),
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider '{0}' does not support mailbox provisioning")]
    UnsupportedProvider(String),
}

/// A label as reported by the provider: opaque id plus the full path name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxLabel {
    pub id: String,
    pub name: String,
}

impl MailboxLabel {
    /// Parent path for nested labels: `FloWorx/Service` has parent
    /// `FloWorx`; a top-level label has none.
    pub fn parent(&self) -> Option<&str> {
        self.name.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Last path segment: `FloWorx/Service` yields `Service`.
    pub fn terminal_segment(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(_, segment)| segment)
            .unwrap_or(&self.name)
    }
}

#[async_trait]
pub trait LabelProvider: Send + Sync {
    async fn list_labels(&self) -> Result<Vec<MailboxLabel>, MailboxError>;
    async fn create_label(&self, name: &str) -> Result<MailboxLabel, MailboxError>;
}

/// Builds a [`LabelProvider`] for a given client, resolving that client's
/// credentials.
pub trait LabelProviderFactory: Send + Sync {
    fn provider_for(&self, client_id: &str) -> Result<Arc<dyn LabelProvider>, MailboxError>;
}

// ============================================================================
// Gmail REST implementation
// ============================================================================

#[derive(Debug, Deserialize)]
struct LabelListResponse {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailLabel {
    id: String,
    name: String,
    #[allow(dead_code)]
    #[serde(default)]
    r#type: Option<String>,
}

impl From<GmailLabel> for MailboxLabel {
    fn from(label: GmailLabel) -> Self {
        MailboxLabel {
            id: label.id,
            name: label.name,
        }
    }
}

/// Gmail API v1 label client for the authenticated user's mailbox.
#[derive(Clone)]
pub struct GmailLabelClient {
    auth: GmailAuth,
    http: reqwest::Client,
    base_url: String,
}

impl GmailLabelClient {
    pub fn new(auth: GmailAuth) -> Self {
        Self::with_base_url(auth, DEFAULT_GMAIL_BASE_URL)
    }

    pub fn with_base_url(auth: GmailAuth, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn api_error(response: reqwest::Response) -> MailboxError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        MailboxError::Api { status, message }
    }
}

#[async_trait]
impl LabelProvider for GmailLabelClient {
    async fn list_labels(&self) -> Result<Vec<MailboxLabel>, MailboxError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(format!("{}/users/me/labels", self.base_url))
            .bearer_auth(&token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let body: LabelListResponse = response.json().await?;
        Ok(body.labels.into_iter().map(MailboxLabel::from).collect())
    }

    async fn create_label(&self, name: &str) -> Result<MailboxLabel, MailboxError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(format!("{}/users/me/labels", self.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "name": name,
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show",
            }))
            .send()
            .await?;

        // Gmail answers 409 when the label already exists. Treat that as
        // success and resolve the id from a fresh listing.
        if response.status().as_u16() == 409 {
            info!("label '{}' already exists, resolving id from listing", name);
            let labels = self.list_labels().await?;
            return labels
                .into_iter()
                .find(|label| label.name == name)
                .ok_or_else(|| MailboxError::Api {
                    status: 409,
                    message: format!("label '{name}' conflicted but was not found on relist"),
                });
        }

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let label: GmailLabel = response.json().await?;
        Ok(label.into())
    }
}

/// Default factory: Gmail client with per-client refresh tokens from the
/// environment.
pub struct GmailProviderFactory {
    base_url: String,
}

impl GmailProviderFactory {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_GMAIL_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for GmailProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelProviderFactory for GmailProviderFactory {
    fn provider_for(&self, client_id: &str) -> Result<Arc<dyn LabelProvider>, MailboxError> {
        let config = GmailAuthConfig::from_env_for_client(Some(client_id));
        let auth = GmailAuth::new(config)?;
        Ok(Arc::new(GmailLabelClient::with_base_url(
            auth,
            self.base_url.clone(),
        )))
    }
}
