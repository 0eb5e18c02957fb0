#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockito::ServerGuard;
use serde_json::{json, Value};
use uuid::Uuid;

use client_config_module::client_config::AiSettings;
use client_config_module::config_store::MemoryConfigStore;
use client_config_module::mapping_store::MemoryMappingStore;
use client_config_module::service::{
    build_router, AppState, ServiceConfig, DEFAULT_BODY_MAX_BYTES,
};
use mailbox_module::{LabelProvider, LabelProviderFactory, MailboxError, MailboxLabel};
use workflow_module::TemplateRegistry;

/// A Gmail label surface driven entirely by the test: labels live in a
/// vec, create calls are logged, and named labels can be made to fail.
#[derive(Default)]
pub struct ScriptedLabels {
    labels: Mutex<Vec<MailboxLabel>>,
    fail_creates: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    next_id: AtomicU64,
    create_log: Mutex<Vec<String>>,
}

impl ScriptedLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, id: &str, name: &str) {
        self.labels.lock().unwrap().push(MailboxLabel {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn fail_create(&self, name: &str) {
        self.fail_creates.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_creates.lock().unwrap().clear();
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<String> {
        self.create_log.lock().unwrap().clone()
    }

    pub fn reset_log(&self) {
        self.create_log.lock().unwrap().clear();
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .map(|label| label.name.clone())
            .collect()
    }
}

#[async_trait]
impl LabelProvider for ScriptedLabels {
    async fn list_labels(&self) -> Result<Vec<MailboxLabel>, MailboxError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(MailboxError::Api {
                status: 503,
                message: "scripted list outage".to_string(),
            });
        }
        Ok(self.labels.lock().unwrap().clone())
    }

    async fn create_label(&self, name: &str) -> Result<MailboxLabel, MailboxError> {
        if self.fail_creates.lock().unwrap().contains(name) {
            return Err(MailboxError::Api {
                status: 403,
                message: format!("scripted failure for {name}"),
            });
        }
        self.create_log.lock().unwrap().push(name.to_string());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let label = MailboxLabel {
            id: format!("Label_{id}"),
            name: name.to_string(),
        };
        self.labels.lock().unwrap().push(label.clone());
        Ok(label)
    }
}

pub struct ScriptedFactory {
    pub provider: Arc<ScriptedLabels>,
}

impl LabelProviderFactory for ScriptedFactory {
    fn provider_for(&self, _client_id: &str) -> Result<Arc<dyn LabelProvider>, MailboxError> {
        Ok(self.provider.clone())
    }
}

pub struct TestApp {
    pub base_url: String,
    pub supabase: ServerGuard,
    pub labels: Arc<ScriptedLabels>,
}

/// Serve the real router on an ephemeral port with in-memory stores, a
/// scripted label provider, and a mockito stand-in for Supabase auth.
pub async fn spawn_app() -> TestApp {
    let supabase = mockito::Server::new_async().await;
    let labels = Arc::new(ScriptedLabels::new());

    let config = ServiceConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        supabase_url: supabase.url(),
        supabase_anon_key: "test-anon-key".to_string(),
        db_url: None,
        csrf_secret: "test-csrf-secret".to_string(),
        locked_ai: AiSettings::default(),
        body_max_bytes: DEFAULT_BODY_MAX_BYTES,
    };
    let state = AppState {
        config: Arc::new(config),
        config_store: Arc::new(MemoryConfigStore::new()),
        mapping_store: Arc::new(MemoryMappingStore::new()),
        label_providers: Arc::new(ScriptedFactory {
            provider: labels.clone(),
        }),
        templates: Arc::new(TemplateRegistry::standard()),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            eprintln!("test server error: {err}");
        }
    });

    TestApp {
        base_url: format!("http://{addr}"),
        supabase,
        labels,
    }
}

/// Register a Supabase user for a bearer token.
pub async fn mock_auth(server: &mut ServerGuard, token: &str, user: Uuid) -> mockito::Mock {
    server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", format!("Bearer {token}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": user, "email": "owner@example.com"}).to_string())
        .create_async()
        .await
}

pub async fn fetch_csrf(client: &reqwest::Client, base_url: &str, token: &str) -> String {
    let response = client
        .get(format!("{base_url}/api/csrf-token"))
        .bearer_auth(token)
        .send()
        .await
        .expect("csrf request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("csrf body");
    body["csrfToken"].as_str().expect("csrfToken").to_string()
}

/// A minimal document that passes validation.
pub fn valid_config_body(client_name: &str) -> Value {
    json!({
        "client": {"name": client_name, "timezone": "America/New_York"},
        "channels": {"email": {"provider": "gmail"}},
        "people": {
            "managers": [{"name": "Dana Reyes", "email": "dana@example.com"}],
            "suppliers": ["partsco.com"]
        },
        "signature": "default"
    })
}
