//! Routes for mailbox discovery, label provisioning, and the stored
//! category-to-label mapping.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client_config::{FieldError, Provider, StoredConfig};
use mailbox_module::taxonomy::Category;
use mailbox_module::{CategoryMapping, DiscoveredMailbox, LabelFailure};

use super::auth::{load_tenant, require_auth, require_csrf};
use super::error::ApiError;
use super::state::AppState;

pub(super) fn mailbox_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mailbox/discover", get(discover_mailbox))
        .route("/api/mailbox/provision", post(provision_mailbox))
        .route("/api/mailbox/mapping", get(get_mapping).put(put_mapping))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientQuery {
    client_id: String,
}

/// Provisioning and discovery only speak Gmail today. A client configured
/// for another provider gets a validation error, not a partial attempt.
fn require_gmail(config: Option<&StoredConfig>) -> Result<(), ApiError> {
    let provider = config
        .map(|row| row.config.channels.email.provider)
        .unwrap_or(Provider::Gmail);
    if provider != Provider::Gmail {
        return Err(ApiError::validation(
            format!(
                "provisioning for provider \"{}\" is not yet supported",
                provider.as_str()
            ),
            None,
        ));
    }
    Ok(())
}

/// GET /api/mailbox/discover?clientId=...
async fn discover_mailbox(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
    headers: HeaderMap,
) -> Result<Json<DiscoveredMailbox>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let tenant = load_tenant(&state, &query.client_id, user).await?;
    require_gmail(tenant.config.as_ref())?;

    let provider = state.label_providers.provider_for(&query.client_id)?;
    let discovered = mailbox_module::discover(provider.as_ref()).await?;
    Ok(Json(discovered))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionRequest {
    client_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProvisionResponse {
    pub(super) client_id: String,
    pub(super) created: Vec<String>,
    pub(super) errors: Vec<LabelFailure>,
    pub(super) mapping: Vec<CategoryMapping>,
    pub(super) version: i64,
}

/// POST /api/mailbox/provision
async fn provision_mailbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    require_csrf(&state, &headers, user)?;
    run_provision(&state, &request.client_id, user).await
}

/// Ensure the canonical label tree exists and persist the resulting
/// mapping. Shared by POST /api/mailbox/provision and
/// POST /api/clients/:client_id/provision.
///
/// Creation failures are collected, not fatal: whatever succeeded is
/// stored and reported alongside the errors with a 200. The stored row is
/// only rewritten (and its version bumped) when the mapping changed.
pub(super) async fn run_provision(
    state: &AppState,
    client_id: &str,
    user: Uuid,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let tenant = load_tenant(state, client_id, user).await?;
    require_gmail(tenant.config.as_ref())?;

    let provider = state.label_providers.provider_for(client_id)?;
    let outcome = mailbox_module::provision(provider.as_ref()).await?;

    let unchanged = tenant
        .mapping
        .as_ref()
        .map(|row| row.mapping == outcome.mapping)
        .unwrap_or(false);
    let version = match tenant.mapping.as_ref() {
        Some(row) if unchanged => row.version,
        _ => {
            let store = state.mapping_store.clone();
            let id = client_id.to_string();
            let mapping = outcome.mapping.clone();
            let stored = task::spawn_blocking(move || store.upsert(&id, user, &mapping)).await??;
            stored.version
        }
    };

    if outcome.errors.is_empty() {
        info!(
            "provisioned mailbox for client {}: {} labels created, {} categories mapped",
            client_id,
            outcome.created.len(),
            outcome.mapping.len()
        );
    } else {
        warn!(
            "provisioned mailbox for client {} with {} failures",
            client_id,
            outcome.errors.len()
        );
    }

    Ok(Json(ProvisionResponse {
        client_id: client_id.to_string(),
        created: outcome.created,
        errors: outcome.errors,
        mapping: outcome.mapping,
        version,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingResponse {
    client_id: String,
    version: i64,
    mapping: Vec<CategoryMapping>,
}

/// GET /api/mailbox/mapping?clientId=...
async fn get_mapping(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
    headers: HeaderMap,
) -> Result<Json<MappingResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let tenant = load_tenant(&state, &query.client_id, user).await?;
    let row = tenant
        .mapping
        .ok_or_else(|| ApiError::not_found("no mapping stored for client"))?;
    Ok(Json(MappingResponse {
        client_id: row.client_id,
        version: row.version,
        mapping: row.mapping,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutMappingRequest {
    client_id: String,
    #[serde(default)]
    mapping: Vec<MappingEntryDraft>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingEntryDraft {
    #[serde(default)]
    category: String,
    #[serde(default)]
    gmail_label_id: String,
    #[serde(default)]
    gmail_label_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutMappingResponse {
    ok: bool,
    version: i64,
    mapping: Vec<CategoryMapping>,
}

/// PUT /api/mailbox/mapping
async fn put_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PutMappingRequest>,
) -> Result<Json<PutMappingResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    require_csrf(&state, &headers, user)?;
    load_tenant(&state, &request.client_id, user).await?;

    let mapping = normalize_mapping(&request.mapping)?;

    let store = state.mapping_store.clone();
    let id = request.client_id.clone();
    let to_store = mapping.clone();
    let stored = task::spawn_blocking(move || store.upsert(&id, user, &to_store)).await??;
    info!(
        "stored mailbox mapping for client {} at version {}",
        request.client_id, stored.version
    );
    Ok(Json(PutMappingResponse {
        ok: true,
        version: stored.version,
        mapping,
    }))
}

/// Check every entry, keeping the first one per category. Unknown
/// categories and blank label fields are hard errors so a bad mapping is
/// never silently truncated into the store.
fn normalize_mapping(drafts: &[MappingEntryDraft]) -> Result<Vec<CategoryMapping>, ApiError> {
    let mut errors = Vec::new();
    let mut seen: Vec<Category> = Vec::new();
    let mut mapping = Vec::new();

    for (index, draft) in drafts.iter().enumerate() {
        let Some(category) = Category::from_key(&draft.category) else {
            errors.push(FieldError::new(
                format!("mapping[{index}].category"),
                format!("unknown category \"{}\"", draft.category.trim()),
            ));
            continue;
        };
        let id = draft.gmail_label_id.trim();
        let name = draft.gmail_label_name.trim();
        if id.is_empty() || name.is_empty() {
            errors.push(FieldError::new(
                format!("mapping[{index}]"),
                "gmailLabelId and gmailLabelName must be non-empty",
            ));
            continue;
        }
        if seen.contains(&category) {
            continue;
        }
        seen.push(category);
        mapping.push(CategoryMapping {
            category,
            gmail_label_id: id.to_string(),
            gmail_label_name: name.to_string(),
        });
    }

    if !errors.is_empty() {
        return Err(ApiError::validation(
            "mapping validation failed",
            serde_json::to_value(&errors).ok(),
        ));
    }
    Ok(mapping)
}
