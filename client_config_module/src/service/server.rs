use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::task;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config_store::{ConfigStore, MemoryConfigStore, PostgresConfigStore};
use crate::mapping_store::{MappingStore, MemoryMappingStore, PostgresMappingStore};
use mailbox_module::GmailProviderFactory;
use workflow_module::TemplateRegistry;

use super::client_api::client_router;
use super::config::ServiceConfig;
use super::mailbox_api::mailbox_router;
use super::state::AppState;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);

    let (config_store, mapping_store): (Arc<dyn ConfigStore>, Arc<dyn MappingStore>) =
        match config.db_url.clone() {
            Some(db_url) => {
                let url = db_url.clone();
                let configs = task::spawn_blocking(move || {
                    let store = PostgresConfigStore::new(&url)?;
                    store.ensure_schema()?;
                    Ok::<_, crate::config_store::ConfigStoreError>(store)
                })
                .await
                .map_err(|err| -> BoxError { err.into() })??;

                let mappings = task::spawn_blocking(move || {
                    let store = PostgresMappingStore::new(&db_url)?;
                    store.ensure_schema()?;
                    Ok::<_, crate::mapping_store::MappingStoreError>(store)
                })
                .await
                .map_err(|err| -> BoxError { err.into() })??;

                (Arc::new(configs) as Arc<dyn ConfigStore>, Arc::new(mappings) as Arc<dyn MappingStore>)
            }
            None => {
                warn!("FLOWORX_DB_URL not set; using in-memory stores (state is lost on restart)");
                (
                    Arc::new(MemoryConfigStore::new()) as Arc<dyn ConfigStore>,
                    Arc::new(MemoryMappingStore::new()) as Arc<dyn MappingStore>,
                )
            }
        };

    let state = AppState {
        config: config.clone(),
        config_store,
        mapping_store,
        label_providers: Arc::new(GmailProviderFactory::new()),
        templates: Arc::new(TemplateRegistry::standard()),
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("FloWorx config service listening on {}", addr);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let body_max_bytes = state.config.body_max_bytes;
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .merge(client_router(state.clone()))
        .merge(mailbox_router(state))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_max_bytes))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
