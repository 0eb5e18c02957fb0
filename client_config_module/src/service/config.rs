use std::env;

use rand::Rng;
use tracing::warn;

use crate::client_config::AiSettings;

use super::BoxError;

pub const DEFAULT_BODY_MAX_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Supabase project base URL, e.g. https://xyz.supabase.co
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Postgres connection URL; absent means in-memory stores.
    pub db_url: Option<String>,
    /// Secret behind issued CSRF tokens.
    pub csrf_secret: String,
    /// Server-held AI settings written into every stored document.
    pub locked_ai: AiSettings,
    pub body_max_bytes: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("FLOWORX_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("FLOWORX_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8660);

        let supabase_url = env::var("SUPABASE_PROJECT_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| "SUPABASE_PROJECT_URL is required".to_string())?;
        let supabase_anon_key = env::var("SUPABASE_ANON_KEY").unwrap_or_default();

        let db_url = env::var("FLOWORX_DB_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let csrf_secret = match env::var("FLOWORX_CSRF_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            Some(secret) => secret,
            None => {
                warn!(
                    "FLOWORX_CSRF_SECRET not set; issued CSRF tokens will not survive a restart"
                );
                let bytes: [u8; 32] = rand::thread_rng().gen();
                hex::encode(bytes)
            }
        };

        let defaults = AiSettings::default();
        let locked_ai = AiSettings {
            model: env::var("FLOWORX_AI_MODEL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.model),
            temperature: env::var("FLOWORX_AI_TEMPERATURE")
                .ok()
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| (0.0..=2.0).contains(value))
                .unwrap_or(defaults.temperature),
            max_tokens: env::var("FLOWORX_AI_MAX_TOKENS")
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_tokens),
            signature_locked: env_flag("FLOWORX_SIGNATURE_LOCKED", defaults.signature_locked),
        };

        let body_max_bytes = env::var("FLOWORX_BODY_MAX_BYTES")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BODY_MAX_BYTES);

        Ok(Self {
            host,
            port,
            supabase_url,
            supabase_anon_key,
            db_url,
            csrf_secret,
            locked_ai,
            body_max_bytes,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
