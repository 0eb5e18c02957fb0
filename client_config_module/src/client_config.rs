//! The client configuration document model.
//!
//! One versioned document per client, stored as JSONB. Wire names are
//! camelCase throughout; the typed structs are the contract, there is no
//! schema reflection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use mailbox_module::taxonomy::Category;

/// Email provider the client's mailbox lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    O365,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::O365 => "o365",
        }
    }

    /// Parse a raw provider value: trimmed, case-insensitive.
    pub fn parse(raw: &str) -> Option<Provider> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gmail" => Some(Provider::Gmail),
            "o365" => Some(Provider::O365),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChannel {
    pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    pub email: EmailChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct People {
    pub managers: Vec<Manager>,
    #[serde(default)]
    pub suppliers: Vec<String>,
}

/// Reply signature: the product default, or client-supplied text.
///
/// Serialized as a plain string; the literal `default` (any casing) means
/// the default signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Signature {
    Default,
    Custom(String),
}

impl Signature {
    pub fn as_custom(&self) -> Option<&str> {
        match self {
            Signature::Default => None,
            Signature::Custom(text) => Some(text),
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Signature::Default => "default",
            Signature::Custom(text) => text,
        }
    }
}

impl From<String> for Signature {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("default") {
            Signature::Default
        } else {
            Signature::Custom(trimmed.to_string())
        }
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        signature.as_text().to_string()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::Default
    }
}

/// Server-held AI settings. Clients cannot set these; whatever a PUT
/// carries is replaced wholesale by the locked values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub signature_locked: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 600,
            signature_locked: true,
        }
    }
}

/// The full normalized configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub client: ClientInfo,
    pub channels: Channels,
    pub people: People,
    /// Category key to label names, de-duplicated per category.
    pub label_map: BTreeMap<String, Vec<String>>,
    pub signature: Signature,
    pub ai: AiSettings,
}

impl ClientConfig {
    /// The document served for clients with nothing stored yet. Required
    /// fields are deliberately blank so the default cannot be PUT back
    /// unchanged.
    pub fn default_document(locked: &AiSettings) -> Self {
        let mut label_map = BTreeMap::new();
        for category in Category::ALL {
            label_map.insert(category.key().to_string(), vec![category.label_path()]);
        }
        Self {
            client: ClientInfo {
                name: String::new(),
                timezone: "UTC".to_string(),
            },
            channels: Channels {
                email: EmailChannel {
                    provider: Provider::Gmail,
                },
            },
            people: People {
                managers: Vec::new(),
                suppliers: Vec::new(),
            },
            label_map,
            signature: Signature::Default,
            ai: locked.clone(),
        }
    }
}

/// A stored configuration row.
#[derive(Debug, Clone)]
pub struct StoredConfig {
    pub client_id: String,
    pub auth_user_id: Uuid,
    pub version: i64,
    pub config: ClientConfig,
    pub updated_at: DateTime<Utc>,
}

/// A single validation finding, addressed by document path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_as_string() {
        let default: Signature = serde_json::from_str("\"default\"").expect("parse");
        assert_eq!(default, Signature::Default);
        let default: Signature = serde_json::from_str("\"Default\"").expect("parse");
        assert_eq!(default, Signature::Default);

        let custom: Signature = serde_json::from_str("\"Cheers,\\nThe Team\"").expect("parse");
        assert_eq!(custom.as_custom(), Some("Cheers,\nThe Team"));

        let encoded = serde_json::to_string(&Signature::Custom("Cheers".to_string())).expect("encode");
        assert_eq!(encoded, "\"Cheers\"");
        let encoded = serde_json::to_string(&Signature::Default).expect("encode");
        assert_eq!(encoded, "\"default\"");
    }

    #[test]
    fn provider_parse_is_lenient_about_case_and_whitespace() {
        assert_eq!(Provider::parse(" Gmail "), Some(Provider::Gmail));
        assert_eq!(Provider::parse("O365"), Some(Provider::O365));
        assert_eq!(Provider::parse("imap"), None);
    }

    #[test]
    fn default_document_seeds_canonical_label_map() {
        let doc = ClientConfig::default_document(&AiSettings::default());
        assert_eq!(doc.client.timezone, "UTC");
        assert!(doc.people.managers.is_empty());
        assert_eq!(doc.label_map.len(), 6);
        assert_eq!(
            doc.label_map.get("service"),
            Some(&vec!["FloWorx/Service".to_string()])
        );
    }

    #[test]
    fn config_serializes_with_camel_case_wire_names() {
        let doc = ClientConfig::default_document(&AiSettings::default());
        let value = serde_json::to_value(&doc).expect("serialize");
        assert!(value.get("labelMap").is_some());
        assert!(value["ai"].get("maxTokens").is_some());
        assert!(value["ai"].get("signatureLocked").is_some());
        assert_eq!(value["channels"]["email"]["provider"], "gmail");
    }
}
