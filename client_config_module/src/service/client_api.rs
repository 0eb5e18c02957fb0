//! Routes for the configuration document and workflow preview.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task;
use tracing::info;

use crate::client_config::ClientConfig;
use crate::validation::{validate_and_normalize, ConfigDraft};
use workflow_module::{parameterize, select_workflow, Industry, TemplateTier, WorkflowParams};

use super::auth::{issue_csrf_token, load_tenant, require_auth, require_csrf};
use super::error::ApiError;
use super::mailbox_api::{run_provision, ProvisionResponse};
use super::state::AppState;

pub(super) fn client_router(state: AppState) -> Router {
    Router::new()
        .route("/api/csrf-token", get(csrf_token))
        .route(
            "/api/clients/:client_id/config",
            get(get_config).put(put_config),
        )
        .route("/api/clients/:client_id/provision", post(provision_client))
        .route("/api/clients/:client_id/workflow", get(get_workflow))
        .with_state(state)
}

/// GET /api/csrf-token
async fn csrf_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let token = issue_csrf_token(&state.config.csrf_secret, user)?;
    Ok(Json(json!({ "csrfToken": token })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    client_id: String,
    version: i64,
    config: ClientConfig,
}

/// GET /api/clients/:client_id/config
///
/// Serves the stored document, or the defaults at version 0 for a client
/// that has never saved one.
async fn get_config(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConfigResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let tenant = load_tenant(&state, &client_id, user).await?;
    let (version, config) = match tenant.config {
        Some(stored) => (stored.version, stored.config),
        None => (0, ClientConfig::default_document(&state.config.locked_ai)),
    };
    Ok(Json(ConfigResponse {
        client_id,
        version,
        config,
    }))
}

#[derive(Debug, Serialize)]
struct PutConfigResponse {
    ok: bool,
    version: i64,
}

/// PUT /api/clients/:client_id/config
async fn put_config(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<PutConfigResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    require_csrf(&state, &headers, user)?;
    load_tenant(&state, &client_id, user).await?;

    let draft: ConfigDraft = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid config document: {}", e), None))?;
    let config = validate_and_normalize(draft, &state.config.locked_ai).map_err(|errors| {
        ApiError::validation(
            "config validation failed",
            serde_json::to_value(&errors).ok(),
        )
    })?;

    let store = state.config_store.clone();
    let id = client_id.clone();
    let stored = task::spawn_blocking(move || store.upsert(&id, user, &config)).await??;
    info!(
        "stored config for client {} at version {}",
        client_id, stored.version
    );
    Ok(Json(PutConfigResponse {
        ok: true,
        version: stored.version,
    }))
}

/// POST /api/clients/:client_id/provision
async fn provision_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    require_csrf(&state, &headers, user)?;
    run_provision(&state, &client_id, user).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowResponse {
    industry: Option<Industry>,
    tier: TemplateTier,
    workflow: Value,
}

/// GET /api/clients/:client_id/workflow
///
/// Select the template for the client's trade and fill in its
/// placeholders from the stored (or default) document.
async fn get_workflow(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let tenant = load_tenant(&state, &client_id, user).await?;
    let config = tenant
        .config
        .map(|stored| stored.config)
        .unwrap_or_else(|| ClientConfig::default_document(&state.config.locked_ai));

    let descriptors = [config.client.name.as_str()];
    let selected = select_workflow(&state.templates, &descriptors);
    let params = workflow_params(&client_id, &config);
    let workflow = parameterize(&selected.document, &params);

    Ok(Json(WorkflowResponse {
        industry: selected.industry,
        tier: selected.tier,
        workflow,
    }))
}

fn workflow_params(client_id: &str, config: &ClientConfig) -> WorkflowParams {
    let manager = config.people.managers.first();
    WorkflowParams {
        client_id: client_id.to_string(),
        client_name: config.client.name.clone(),
        timezone: config.client.timezone.clone(),
        provider: config.channels.email.provider.as_str().to_string(),
        ai_model: config.ai.model.clone(),
        ai_temperature: config.ai.temperature,
        ai_max_tokens: config.ai.max_tokens,
        signature: config.signature.as_text().to_string(),
        manager_name: manager.map(|m| m.name.clone()),
        manager_email: manager.map(|m| m.email.clone()),
        supplier_domains: config.people.suppliers.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_config::{AiSettings, Manager};

    #[test]
    fn workflow_params_take_the_first_manager() {
        let mut config = ClientConfig::default_document(&AiSettings::default());
        config.client.name = "Back Bay Spas".to_string();
        config.people.managers = vec![
            Manager {
                name: "Dana Reyes".to_string(),
                email: "dana@backbayspas.com".to_string(),
            },
            Manager {
                name: "Sam Ortiz".to_string(),
                email: "sam@backbayspas.com".to_string(),
            },
        ];
        config.people.suppliers = vec!["partsco.com".to_string()];

        let params = workflow_params("hottub-001", &config);
        assert_eq!(params.client_id, "hottub-001");
        assert_eq!(params.manager_name.as_deref(), Some("Dana Reyes"));
        assert_eq!(params.manager_email.as_deref(), Some("dana@backbayspas.com"));
        assert_eq!(params.provider, "gmail");
        assert_eq!(params.signature, "default");
        assert_eq!(params.supplier_domains, vec!["partsco.com"]);
    }
}
