//! Validation and normalization of incoming configuration documents.
//!
//! A PUT body is parsed into [`ConfigDraft`] (everything optional) and then
//! checked field by field. All findings are collected before returning so a
//! caller sees the full list in one round trip.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::client_config::{
    AiSettings, Channels, ClientConfig, ClientInfo, EmailChannel, FieldError, Manager, People,
    Provider, Signature,
};
use crate::signature_guard;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

/// Loosely-typed incoming document. Unknown fields are ignored; the `ai`
/// block in particular is accepted and discarded.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDraft {
    #[serde(default)]
    pub client: Option<DraftClient>,
    #[serde(default)]
    pub channels: Option<DraftChannels>,
    #[serde(default)]
    pub people: Option<DraftPeople>,
    #[serde(default)]
    pub label_map: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftClient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftChannels {
    #[serde(default)]
    pub email: Option<DraftEmail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftEmail {
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftPeople {
    #[serde(default)]
    pub managers: Option<Vec<DraftManager>>,
    #[serde(default)]
    pub suppliers: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DraftManager {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Validate a draft and produce the normalized document, or every finding.
///
/// The `locked` settings are written into the result unconditionally; any
/// `ai` block the caller sent has already been dropped by the draft parse.
pub fn validate_and_normalize(
    draft: ConfigDraft,
    locked: &AiSettings,
) -> Result<ClientConfig, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = required_string(
        draft.client.as_ref().and_then(|c| c.name.as_deref()),
        "client.name",
        &mut errors,
    );
    let timezone = required_string(
        draft.client.as_ref().and_then(|c| c.timezone.as_deref()),
        "client.timezone",
        &mut errors,
    );

    let provider_raw = draft
        .channels
        .as_ref()
        .and_then(|c| c.email.as_ref())
        .and_then(|e| e.provider.as_deref());
    let provider = match provider_raw {
        Some(raw) => match Provider::parse(raw) {
            Some(provider) => Some(provider),
            None => {
                errors.push(FieldError::new(
                    "channels.email.provider",
                    "must be one of: gmail, o365",
                ));
                None
            }
        },
        None => {
            errors.push(FieldError::new(
                "channels.email.provider",
                "must be a non-empty string",
            ));
            None
        }
    };

    let managers = validate_managers(
        draft.people.as_ref().and_then(|p| p.managers.as_deref()),
        &mut errors,
    );
    let suppliers = normalize_suppliers(
        draft.people.as_ref().and_then(|p| p.suppliers.as_deref()),
    );

    let signature = match draft.signature {
        Some(raw) => Signature::from(raw),
        None => Signature::Default,
    };
    if locked.signature_locked {
        if let Some(text) = signature.as_custom() {
            if let Some(manager) = signature_guard::find_locked_name(text, &managers) {
                errors.push(FieldError::new(
                    "signature",
                    format!(
                        "custom signature may not mention manager \"{manager}\" while signatures are locked"
                    ),
                ));
            }
        }
    }

    let label_map = match draft.label_map {
        Some(raw) => normalize_label_map(raw),
        None => ClientConfig::default_document(locked).label_map,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    // All required values are present once the error list is empty.
    let (Some(name), Some(timezone), Some(provider)) = (name, timezone, provider) else {
        return Err(vec![FieldError::new("config", "incomplete document")]);
    };

    Ok(ClientConfig {
        client: ClientInfo { name, timezone },
        channels: Channels {
            email: EmailChannel { provider },
        },
        people: People {
            managers,
            suppliers,
        },
        label_map,
        signature,
        ai: locked.clone(),
    })
}

fn required_string(
    raw: Option<&str>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match raw.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Some(trimmed.to_string()),
        _ => {
            errors.push(FieldError::new(field, "must be a non-empty string"));
            None
        }
    }
}

fn validate_managers(
    drafts: Option<&[DraftManager]>,
    errors: &mut Vec<FieldError>,
) -> Vec<Manager> {
    let drafts = match drafts {
        Some(drafts) if !drafts.is_empty() => drafts,
        _ => {
            errors.push(FieldError::new(
                "people.managers",
                "at least one manager is required",
            ));
            return Vec::new();
        }
    };

    let mut managers = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.iter().enumerate() {
        let name = draft.name.as_deref().map(str::trim).unwrap_or("");
        if name.is_empty() {
            errors.push(FieldError::new(
                format!("people.managers[{index}].name"),
                "must be a non-empty string",
            ));
        }
        let email = draft.email.as_deref().map(str::trim).unwrap_or("");
        if !EMAIL_PATTERN.is_match(email) {
            errors.push(FieldError::new(
                format!("people.managers[{index}].email"),
                "must be a valid email address",
            ));
        }
        managers.push(Manager {
            name: name.to_string(),
            email: email.to_ascii_lowercase(),
        });
    }
    managers
}

/// Suppliers are matched against sender domains downstream, so they are
/// lowercased here; order of first appearance is kept.
fn normalize_suppliers(raw: Option<&[String]>) -> Vec<String> {
    let mut suppliers = Vec::new();
    for entry in raw.unwrap_or_default() {
        let normalized = entry.trim().to_ascii_lowercase();
        if normalized.is_empty() || suppliers.contains(&normalized) {
            continue;
        }
        suppliers.push(normalized);
    }
    suppliers
}

/// Keep every key the caller sent; within each list, keep scalar entries
/// (stringified), drop nulls and nested containers, and de-duplicate
/// exact matches after trimming.
fn normalize_label_map(raw: BTreeMap<String, Value>) -> BTreeMap<String, Vec<String>> {
    let mut label_map = BTreeMap::new();
    for (key, value) in raw {
        let entries: Vec<&Value> = match &value {
            Value::Array(entries) => entries.iter().collect(),
            Value::Null | Value::Object(_) => continue,
            scalar => vec![scalar],
        };
        let mut labels = Vec::new();
        for entry in entries {
            let label = match entry {
                Value::String(text) => text.trim().to_string(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            if label.is_empty() || labels.contains(&label) {
                continue;
            }
            labels.push(label);
        }
        label_map.insert(key, labels);
    }
    label_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(value: Value) -> ConfigDraft {
        serde_json::from_value(value).expect("draft parse")
    }

    fn valid_draft() -> Value {
        json!({
            "client": {"name": "Back Bay Spas", "timezone": "America/New_York"},
            "channels": {"email": {"provider": "gmail"}},
            "people": {
                "managers": [{"name": "Dana Reyes", "email": "Dana@BackBaySpas.com"}],
                "suppliers": ["PartsCo.com"]
            },
            "signature": "default"
        })
    }

    #[test]
    fn empty_draft_reports_every_required_field() {
        let errors = validate_and_normalize(ConfigDraft::default(), &AiSettings::default())
            .expect_err("must fail");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "client.name",
                "client.timezone",
                "channels.email.provider",
                "people.managers",
            ]
        );
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut body = valid_draft();
        body["channels"]["email"]["provider"] = json!("imap");
        let errors = validate_and_normalize(draft(body), &AiSettings::default())
            .expect_err("must fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "channels.email.provider");
        assert_eq!(errors[0].message, "must be one of: gmail, o365");
    }

    #[test]
    fn every_bad_manager_entry_is_itemized() {
        let mut body = valid_draft();
        body["people"]["managers"] = json!([
            {"name": "Dana Reyes", "email": "dana@backbayspas.com"},
            {"name": "  ", "email": "not-an-email"},
        ]);
        let errors = validate_and_normalize(draft(body), &AiSettings::default())
            .expect_err("must fail");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["people.managers[1].name", "people.managers[1].email"]
        );
    }

    #[test]
    fn manager_emails_are_trimmed_and_lowercased() {
        let config = validate_and_normalize(draft(valid_draft()), &AiSettings::default())
            .expect("valid");
        assert_eq!(config.people.managers[0].email, "dana@backbayspas.com");
        assert_eq!(config.people.managers[0].name, "Dana Reyes");
    }

    #[test]
    fn suppliers_are_lowercased_and_deduplicated() {
        let mut body = valid_draft();
        body["people"]["suppliers"] = json!(["PartsCo.com", "partsco.com", "  ", " Poolmart.NET "]);
        let config = validate_and_normalize(draft(body), &AiSettings::default()).expect("valid");
        assert_eq!(config.people.suppliers, vec!["partsco.com", "poolmart.net"]);
    }

    #[test]
    fn label_map_keeps_scalars_and_drops_the_rest() {
        let mut body = valid_draft();
        body["labelMap"] = json!({
            "service": ["FloWorx/Service", " FloWorx/Service ", 7, true, null, {"x": 1}],
            "noise": {"not": "a list"},
            "sales": "FloWorx/Sales"
        });
        let config = validate_and_normalize(draft(body), &AiSettings::default()).expect("valid");
        assert_eq!(
            config.label_map.get("service"),
            Some(&vec![
                "FloWorx/Service".to_string(),
                "7".to_string(),
                "true".to_string(),
            ])
        );
        assert_eq!(
            config.label_map.get("sales"),
            Some(&vec!["FloWorx/Sales".to_string()])
        );
        assert!(!config.label_map.contains_key("noise"));
    }

    #[test]
    fn absent_label_map_is_seeded_with_canonical_labels() {
        let config = validate_and_normalize(draft(valid_draft()), &AiSettings::default())
            .expect("valid");
        assert_eq!(config.label_map.len(), 6);
        assert_eq!(
            config.label_map.get("warranty"),
            Some(&vec!["FloWorx/Warranty".to_string()])
        );
    }

    #[test]
    fn locked_signature_may_not_mention_a_manager() {
        let mut body = valid_draft();
        body["signature"] = json!("Best,\nDana Reyes\nBack Bay Spas");
        let errors = validate_and_normalize(draft(body), &AiSettings::default())
            .expect_err("must fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "signature");
        assert!(errors[0].message.contains("Dana Reyes"));
    }

    #[test]
    fn unlocked_signature_may_mention_a_manager() {
        let unlocked = AiSettings {
            signature_locked: false,
            ..AiSettings::default()
        };
        let mut body = valid_draft();
        body["signature"] = json!("Best,\nDana Reyes");
        let config = validate_and_normalize(draft(body), &unlocked).expect("valid");
        assert_eq!(config.signature.as_custom(), Some("Best,\nDana Reyes"));
        assert!(!config.ai.signature_locked);
    }

    #[test]
    fn ai_block_in_the_body_is_replaced_by_locked_settings() {
        let mut body = valid_draft();
        body["ai"] = json!({"model": "gpt-4o", "temperature": 1.9, "maxTokens": 9000});
        let config = validate_and_normalize(draft(body), &AiSettings::default()).expect("valid");
        assert_eq!(config.ai, AiSettings::default());
    }
}
