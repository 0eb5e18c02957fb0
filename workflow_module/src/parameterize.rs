//! Fill `<<TOKEN>>` placeholders in a workflow document with client values.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<<([A-Z0-9_]+)>>").unwrap()
});

/// Per-client values substituted into a workflow template.
///
/// Missing optional values substitute as empty strings; tokens with no
/// entry in the table pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkflowParams {
    pub client_id: String,
    pub client_name: String,
    pub timezone: String,
    pub provider: String,
    pub ai_model: String,
    pub ai_temperature: f64,
    pub ai_max_tokens: u32,
    pub signature: String,
    pub manager_name: Option<String>,
    pub manager_email: Option<String>,
    pub supplier_domains: Vec<String>,
}

impl WorkflowParams {
    fn token_table(&self) -> BTreeMap<&'static str, String> {
        let mut table = BTreeMap::new();
        table.insert("CLIENT_ID", self.client_id.clone());
        table.insert("CLIENT_NAME", self.client_name.clone());
        table.insert("TIMEZONE", self.timezone.clone());
        table.insert("PROVIDER", self.provider.clone());
        table.insert("AI_MODEL", self.ai_model.clone());
        table.insert("AI_TEMPERATURE", format_float(self.ai_temperature));
        table.insert("AI_MAX_TOKENS", self.ai_max_tokens.to_string());
        table.insert("SIGNATURE", self.signature.clone());
        table.insert(
            "MANAGER_NAME",
            self.manager_name.clone().unwrap_or_default(),
        );
        table.insert(
            "MANAGER_EMAIL",
            self.manager_email.clone().unwrap_or_default(),
        );
        table.insert("SUPPLIER_DOMAINS", self.supplier_domains.join(", "));
        table
    }
}

fn format_float(value: f64) -> String {
    // Keep serde_json's canonical formatting (1.0 stays "1.0", not "1").
    Number::from_f64(value)
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Substitute tokens throughout the document.
///
/// A string consisting solely of a single numeric token becomes a JSON
/// number, so `"<<AI_MAX_TOKENS>>"` ends up as `600`, not `"600"`.
pub fn parameterize(document: &Value, params: &WorkflowParams) -> Value {
    let table = params.token_table();
    substitute(document, &table)
}

fn substitute(value: &Value, table: &BTreeMap<&'static str, String>) -> Value {
    match value {
        Value::String(text) => substitute_string(text, table),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute(item, table)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute(item, table)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_string(text: &str, table: &BTreeMap<&'static str, String>) -> Value {
    // Whole-string token: allow type coercion to a number.
    if let Some(captures) = TOKEN_PATTERN.captures(text) {
        if let Some(full) = captures.get(0) {
            if full.start() == 0 && full.end() == text.len() {
                let name = &captures[1];
                if let Some(replacement) = table.get(name) {
                    if let Ok(int) = replacement.parse::<i64>() {
                        return Value::Number(Number::from(int));
                    }
                    if let Ok(float) = replacement.parse::<f64>() {
                        if let Some(number) = Number::from_f64(float) {
                            return Value::Number(number);
                        }
                    }
                    return Value::String(replacement.clone());
                }
                return Value::String(text.to_string());
            }
        }
    }

    let replaced = TOKEN_PATTERN.replace_all(text, |captures: &regex::Captures<'_>| {
        let name = &captures[1];
        match table.get(name) {
            Some(replacement) => replacement.clone(),
            None => captures[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> WorkflowParams {
        WorkflowParams {
            client_id: "acme".to_string(),
            client_name: "Acme Hot Tubs".to_string(),
            timezone: "America/Toronto".to_string(),
            provider: "gmail".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_temperature: 0.2,
            ai_max_tokens: 600,
            signature: "default".to_string(),
            manager_name: Some("Dana Fox".to_string()),
            manager_email: Some("dana@acme.example".to_string()),
            supplier_domains: vec!["spadepot.com".to_string(), "partsco.net".to_string()],
        }
    }

    #[test]
    fn substitutes_tokens_inside_strings() {
        let doc = json!({ "subject": "[<<CLIENT_NAME>>] escalation to <<MANAGER_NAME>>" });
        let out = parameterize(&doc, &params());
        assert_eq!(
            out["subject"],
            json!("[Acme Hot Tubs] escalation to Dana Fox")
        );
    }

    #[test]
    fn whole_string_numeric_tokens_become_numbers() {
        let doc = json!({ "temperature": "<<AI_TEMPERATURE>>", "maxTokens": "<<AI_MAX_TOKENS>>" });
        let out = parameterize(&doc, &params());
        assert_eq!(out["temperature"], json!(0.2));
        assert_eq!(out["maxTokens"], json!(600));
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let doc = json!({ "expr": "<<NOT_A_TOKEN>> stays, <<CLIENT_ID>> goes" });
        let out = parameterize(&doc, &params());
        assert_eq!(out["expr"], json!("<<NOT_A_TOKEN>> stays, acme goes"));
    }

    #[test]
    fn n8n_expressions_survive_untouched() {
        let doc = json!({ "value1": "={{ $json.category }}" });
        let out = parameterize(&doc, &params());
        assert_eq!(out["value1"], json!("={{ $json.category }}"));
    }

    #[test]
    fn missing_manager_substitutes_empty() {
        let mut p = params();
        p.manager_name = None;
        p.manager_email = None;
        let doc = json!({ "to": "<<MANAGER_EMAIL>>" });
        let out = parameterize(&doc, &p);
        assert_eq!(out["to"], json!(""));
    }

    #[test]
    fn supplier_domains_join_with_commas() {
        let doc = json!({ "suppliers": "<<SUPPLIER_DOMAINS>>" });
        let out = parameterize(&doc, &params());
        assert_eq!(out["suppliers"], json!("spadepot.com, partsco.net"));
    }

    #[test]
    fn walks_nested_arrays_and_objects() {
        let doc = json!({
            "nodes": [ { "parameters": { "timezone": "<<TIMEZONE>>" } } ]
        });
        let out = parameterize(&doc, &params());
        assert_eq!(
            out["nodes"][0]["parameters"]["timezone"],
            json!("America/Toronto")
        );
    }
}
