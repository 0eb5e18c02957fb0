//! Persistence for client configuration documents.
//!
//! Postgres is the real backend; an in-memory store backs local runs and
//! tests. Both sit behind [`ConfigStore`], and handlers reach them through
//! `spawn_blocking` since the postgres driver is synchronous.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use chrono::Utc;
use postgres_native_tls::MakeTlsConnector;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::client_config::{ClientConfig, StoredConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("stored document is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing FLOWORX_DB_URL")]
    MissingDbUrl,
    #[error("client is owned by a different user")]
    NotOwner,
    #[error("config error: {0}")]
    Config(String),
}

/// Reads and writes of versioned configuration rows.
///
/// `upsert` claims the client for `auth_user_id` on first write and must
/// refuse writes from any other user afterwards.
pub trait ConfigStore: Send + Sync {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredConfig>, ConfigStoreError>;
    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        config: &ClientConfig,
    ) -> Result<StoredConfig, ConfigStoreError>;
}

/// Custom error handler that logs connection errors
#[derive(Debug)]
struct LoggingErrorHandler;

impl r2d2::HandleError<postgres::Error> for LoggingErrorHandler {
    fn handle_error(&self, err: postgres::Error) {
        error!("config_store postgres pool error: {:?}", err);
    }
}

#[derive(Clone)]
pub struct PostgresConfigStore {
    pool: Option<Pool<PostgresConnectionManager<MakeTlsConnector>>>,
}

impl PostgresConfigStore {
    pub fn from_env() -> Result<Self, ConfigStoreError> {
        let db_url = env::var("FLOWORX_DB_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigStoreError::MissingDbUrl)?;
        Self::new(&db_url)
    }

    pub fn new(db_url: &str) -> Result<Self, ConfigStoreError> {
        let config: postgres::Config = db_url.parse()?;

        let mut tls_builder = native_tls::TlsConnector::builder();
        if env::var("FLOWORX_DB_TLS_ALLOW_INVALID_CERTS")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
        {
            tls_builder.danger_accept_invalid_certs(true);
            tls_builder.danger_accept_invalid_hostnames(true);
        }
        let tls_connector = tls_builder
            .build()
            .map_err(|e| ConfigStoreError::Config(e.to_string()))?;
        let tls = MakeTlsConnector::new(tls_connector);

        let manager = PostgresConnectionManager::new(config, tls);
        let pool = Pool::builder()
            .max_size(10)
            .min_idle(Some(1))
            .connection_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(Some(std::time::Duration::from_secs(60)))
            .error_handler(Box::new(LoggingErrorHandler))
            .build(manager)?;

        Ok(Self { pool: Some(pool) })
    }

    fn conn(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<MakeTlsConnector>>, ConfigStoreError>
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| ConfigStoreError::Config("config store pool dropped".to_string()))?;
        Ok(pool.get()?)
    }

    pub fn ensure_schema(&self) -> Result<(), ConfigStoreError> {
        let mut conn = self.conn()?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS client_configs (
                client_id TEXT PRIMARY KEY,
                auth_user_id UUID NOT NULL,
                version BIGINT NOT NULL,
                config JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS client_configs_auth_user_idx
                ON client_configs (auth_user_id);
            CREATE INDEX IF NOT EXISTS client_configs_config_gin_idx
                ON client_configs USING GIN (config);",
        )?;
        Ok(())
    }
}

impl ConfigStore for PostgresConfigStore {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredConfig>, ConfigStoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT auth_user_id, version, config, updated_at
             FROM client_configs WHERE client_id = $1",
            &[&client_id],
        )?;
        row.map(|r| {
            let document: Value = r.get(2);
            Ok(StoredConfig {
                client_id: client_id.to_string(),
                auth_user_id: r.get(0),
                version: r.get(1),
                config: serde_json::from_value(document)?,
                updated_at: r.get(3),
            })
        })
        .transpose()
    }

    /// Insert-or-bump in one statement. The conditional update leaves the
    /// row untouched for a foreign user, which surfaces as no row returned.
    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        config: &ClientConfig,
    ) -> Result<StoredConfig, ConfigStoreError> {
        let document = serde_json::to_value(config)?;
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "INSERT INTO client_configs (client_id, auth_user_id, version, config, updated_at)
             VALUES ($1, $2, 1, $3, NOW())
             ON CONFLICT (client_id) DO UPDATE
             SET version = client_configs.version + 1,
                 config = EXCLUDED.config,
                 updated_at = NOW()
             WHERE client_configs.auth_user_id = EXCLUDED.auth_user_id
             RETURNING version, updated_at",
            &[&client_id, &auth_user_id, &document],
        )?;
        let row = row.ok_or(ConfigStoreError::NotOwner)?;
        Ok(StoredConfig {
            client_id: client_id.to_string(),
            auth_user_id,
            version: row.get(0),
            config: config.clone(),
            updated_at: row.get(1),
        })
    }
}

impl Drop for PostgresConfigStore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            std::thread::spawn(move || drop(pool));
        }
    }
}

/// Process-local store for runs without a database.
#[derive(Default)]
pub struct MemoryConfigStore {
    rows: Mutex<HashMap<String, StoredConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredConfig>, ConfigStoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| ConfigStoreError::Config("config rows lock poisoned".to_string()))?;
        Ok(rows.get(client_id).cloned())
    }

    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        config: &ClientConfig,
    ) -> Result<StoredConfig, ConfigStoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| ConfigStoreError::Config("config rows lock poisoned".to_string()))?;
        match rows.get_mut(client_id) {
            Some(row) => {
                if row.auth_user_id != auth_user_id {
                    return Err(ConfigStoreError::NotOwner);
                }
                row.version += 1;
                row.config = config.clone();
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
            None => {
                let row = StoredConfig {
                    client_id: client_id.to_string(),
                    auth_user_id,
                    version: 1,
                    config: config.clone(),
                    updated_at: Utc::now(),
                };
                rows.insert(client_id.to_string(), row.clone());
                Ok(row)
            }
        }
    }
}
