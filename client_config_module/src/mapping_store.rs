//! Persistence for mailbox label mappings.
//!
//! Mirrors the config store: one versioned JSONB row per client, claimed
//! by the first authenticated writer, with a memory fallback for runs
//! without a database.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use postgres_native_tls::MakeTlsConnector;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use mailbox_module::CategoryMapping;

#[derive(Debug, Clone)]
pub struct StoredMapping {
    pub client_id: String,
    pub auth_user_id: Uuid,
    pub version: i64,
    pub mapping: Vec<CategoryMapping>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MappingStoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("stored mapping is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing FLOWORX_DB_URL")]
    MissingDbUrl,
    #[error("client is owned by a different user")]
    NotOwner,
    #[error("config error: {0}")]
    Config(String),
}

pub trait MappingStore: Send + Sync {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredMapping>, MappingStoreError>;
    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        mapping: &[CategoryMapping],
    ) -> Result<StoredMapping, MappingStoreError>;
}

#[derive(Debug)]
struct LoggingErrorHandler;

impl r2d2::HandleError<postgres::Error> for LoggingErrorHandler {
    fn handle_error(&self, err: postgres::Error) {
        error!("mapping_store postgres pool error: {:?}", err);
    }
}

#[derive(Clone)]
pub struct PostgresMappingStore {
    pool: Option<Pool<PostgresConnectionManager<MakeTlsConnector>>>,
}

impl PostgresMappingStore {
    pub fn from_env() -> Result<Self, MappingStoreError> {
        let db_url = env::var("FLOWORX_DB_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(MappingStoreError::MissingDbUrl)?;
        Self::new(&db_url)
    }

    pub fn new(db_url: &str) -> Result<Self, MappingStoreError> {
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
            .map_err(|e| MappingStoreError::Config(e.to_string()))?;
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
    ) -> Result<PooledConnection<PostgresConnectionManager<MakeTlsConnector>>, MappingStoreError>
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| MappingStoreError::Config("mapping store pool dropped".to_string()))?;
        Ok(pool.get()?)
    }

    pub fn ensure_schema(&self) -> Result<(), MappingStoreError> {
        let mut conn = self.conn()?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS mailbox_mappings (
                client_id TEXT PRIMARY KEY,
                auth_user_id UUID NOT NULL,
                version BIGINT NOT NULL,
                mapping JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS mailbox_mappings_auth_user_idx
                ON mailbox_mappings (auth_user_id);",
        )?;
        Ok(())
    }
}

impl MappingStore for PostgresMappingStore {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredMapping>, MappingStoreError> {
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "SELECT auth_user_id, version, mapping, updated_at
             FROM mailbox_mappings WHERE client_id = $1",
            &[&client_id],
        )?;
        row.map(|r| {
            let document: Value = r.get(2);
            Ok(StoredMapping {
                client_id: client_id.to_string(),
                auth_user_id: r.get(0),
                version: r.get(1),
                mapping: serde_json::from_value(document)?,
                updated_at: r.get(3),
            })
        })
        .transpose()
    }

    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        mapping: &[CategoryMapping],
    ) -> Result<StoredMapping, MappingStoreError> {
        let document = serde_json::to_value(mapping)?;
        let mut conn = self.conn()?;
        let row = conn.query_opt(
            "INSERT INTO mailbox_mappings (client_id, auth_user_id, version, mapping, updated_at)
             VALUES ($1, $2, 1, $3, NOW())
             ON CONFLICT (client_id) DO UPDATE
             SET version = mailbox_mappings.version + 1,
                 mapping = EXCLUDED.mapping,
                 updated_at = NOW()
             WHERE mailbox_mappings.auth_user_id = EXCLUDED.auth_user_id
             RETURNING version, updated_at",
            &[&client_id, &auth_user_id, &document],
        )?;
        let row = row.ok_or(MappingStoreError::NotOwner)?;
        Ok(StoredMapping {
            client_id: client_id.to_string(),
            auth_user_id,
            version: row.get(0),
            mapping: mapping.to_vec(),
            updated_at: row.get(1),
        })
    }
}

impl Drop for PostgresMappingStore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            std::thread::spawn(move || drop(pool));
        }
    }
}

#[derive(Default)]
pub struct MemoryMappingStore {
    rows: Mutex<HashMap<String, StoredMapping>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryMappingStore {
    fn fetch(&self, client_id: &str) -> Result<Option<StoredMapping>, MappingStoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| MappingStoreError::Config("mapping rows lock poisoned".to_string()))?;
        Ok(rows.get(client_id).cloned())
    }

    fn upsert(
        &self,
        client_id: &str,
        auth_user_id: Uuid,
        mapping: &[CategoryMapping],
    ) -> Result<StoredMapping, MappingStoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| MappingStoreError::Config("mapping rows lock poisoned".to_string()))?;
        match rows.get_mut(client_id) {
            Some(row) => {
                if row.auth_user_id != auth_user_id {
                    return Err(MappingStoreError::NotOwner);
                }
                row.version += 1;
                row.mapping = mapping.to_vec();
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
            None => {
                let row = StoredMapping {
                    client_id: client_id.to_string(),
                    auth_user_id,
                    version: 1,
                    mapping: mapping.to_vec(),
                    updated_at: Utc::now(),
                };
                rows.insert(client_id.to_string(), row.clone());
                Ok(row)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbox_module::taxonomy::Category;

    fn sample_mapping() -> Vec<CategoryMapping> {
        vec![CategoryMapping {
            category: Category::Service,
            gmail_label_id: "Label_10".to_string(),
            gmail_label_name: "FloWorx/Service".to_string(),
        }]
    }

    #[test]
    fn memory_store_versions_and_round_trips() {
        let store = MemoryMappingStore::new();
        let user = Uuid::new_v4();

        let first = store
            .upsert("hottub-001", user, &sample_mapping())
            .expect("first write");
        assert_eq!(first.version, 1);
        let second = store
            .upsert("hottub-001", user, &sample_mapping())
            .expect("second write");
        assert_eq!(second.version, 2);

        let row = store.fetch("hottub-001").expect("fetch").expect("row");
        assert_eq!(row.mapping, sample_mapping());
    }

    #[test]
    fn memory_store_refuses_a_foreign_writer() {
        let store = MemoryMappingStore::new();
        store
            .upsert("hottub-001", Uuid::new_v4(), &sample_mapping())
            .expect("claim");
        let err = store
            .upsert("hottub-001", Uuid::new_v4(), &sample_mapping())
            .expect_err("must refuse");
        assert!(matches!(err, MappingStoreError::NotOwner));
    }
}
