//! Supabase token validation, CSRF tokens, and tenant ownership checks.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::task;
use tracing::error;
use uuid::Uuid;

use crate::client_config::StoredConfig;
use crate::mapping_store::StoredMapping;

use super::error::ApiError;
use super::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Response from Supabase /auth/v1/user endpoint
#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Validate a Supabase access token, returning the auth user ID.
pub(super) async fn validate_supabase_token(
    supabase_url: &str,
    anon_key: &str,
    token: &str,
) -> Result<Uuid, ApiError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/auth/v1/user", supabase_url))
        .header("Authorization", format!("Bearer {}", token))
        .header("apikey", anon_key)
        .send()
        .await
        .map_err(|e| {
            error!("Failed to validate token with Supabase: {}", e);
            ApiError::bad_gateway("failed to validate token")
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        error!("Supabase auth validation failed: {} - {}", status, body);
        return Err(ApiError::unauthorized("invalid or expired token"));
    }

    let user: SupabaseUser = resp.json().await.map_err(|e| {
        error!("Failed to parse Supabase user response: {}", e);
        ApiError::bad_gateway("invalid response from auth service")
    })?;

    tracing::debug!("authenticated supabase user {} ({:?})", user.id, user.email);
    Ok(user.id)
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub(super) async fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;
    validate_supabase_token(
        &state.config.supabase_url,
        &state.config.supabase_anon_key,
        &token,
    )
    .await
}

/// Derive the CSRF token for a user: hex HMAC-SHA256 of the user id.
pub(super) fn issue_csrf_token(secret: &str, auth_user_id: Uuid) -> Result<String, ApiError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(ApiError::internal)?;
    mac.update(auth_user_id.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Mutating routes require the x-csrf-token header to match the token
/// issued for the authenticated user.
pub(super) fn require_csrf(
    state: &AppState,
    headers: &HeaderMap,
    auth_user_id: Uuid,
) -> Result<(), ApiError> {
    let provided = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let expected = issue_csrf_token(&state.config.csrf_secret, auth_user_id)?;
    if provided != expected {
        return Err(ApiError::forbidden("missing or invalid CSRF token"));
    }
    Ok(())
}

pub(super) struct TenantSnapshot {
    pub(super) config: Option<StoredConfig>,
    pub(super) mapping: Option<StoredMapping>,
}

/// Fetch both rows for a client and refuse access if either belongs to a
/// different user. A client with no rows at all is open to any
/// authenticated user; the first write claims it.
pub(super) async fn load_tenant(
    state: &AppState,
    client_id: &str,
    auth_user_id: Uuid,
) -> Result<TenantSnapshot, ApiError> {
    let config_store = state.config_store.clone();
    let id = client_id.to_string();
    let config = task::spawn_blocking(move || config_store.fetch(&id)).await??;

    let mapping_store = state.mapping_store.clone();
    let id = client_id.to_string();
    let mapping = task::spawn_blocking(move || mapping_store.fetch(&id)).await??;

    if let Some(row) = &config {
        if row.auth_user_id != auth_user_id {
            return Err(ApiError::forbidden("client is owned by a different user"));
        }
    }
    if let Some(row) = &mapping {
        if row.auth_user_id != auth_user_id {
            return Err(ApiError::forbidden("client is owned by a different user"));
        }
    }
    Ok(TenantSnapshot { config, mapping })
}
