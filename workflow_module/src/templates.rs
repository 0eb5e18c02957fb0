//! Static n8n workflow documents for email triage automations.
//!
//! Each template is a complete workflow definition with `<<TOKEN>>`
//! placeholders that are filled in per client. Angle-bracket tokens are
//! used instead of n8n's own `{{ }}` expression syntax so that template
//! substitution can never collide with expressions that must survive
//! into the deployed workflow.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

/// Industries with a dedicated workflow template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    HotTubSpa,
    Hvac,
    Plumbing,
    Electrical,
}

impl Industry {
    pub const ALL: [Industry; 4] = [
        Industry::HotTubSpa,
        Industry::Hvac,
        Industry::Plumbing,
        Industry::Electrical,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Industry::HotTubSpa => "hot_tub_spa",
            Industry::Hvac => "hvac",
            Industry::Plumbing => "plumbing",
            Industry::Electrical => "electrical",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Industry::HotTubSpa => "Hot Tub & Spa",
            Industry::Hvac => "HVAC",
            Industry::Plumbing => "Plumbing",
            Industry::Electrical => "Electrical",
        }
    }
}

/// Which rung of the fallback chain a selected workflow came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateTier {
    Industry,
    Enhanced,
    Baseline,
}

impl TemplateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateTier::Industry => "industry",
            TemplateTier::Enhanced => "enhanced",
            TemplateTier::Baseline => "baseline",
        }
    }
}

/// Registry of workflow documents, one per industry plus the generic
/// enhanced template and the minimal baseline.
///
/// The baseline is always present; the industry and enhanced slots can be
/// absent, which is what makes the selection fallback chain observable.
pub struct TemplateRegistry {
    industries: BTreeMap<Industry, Value>,
    enhanced: Option<Value>,
    baseline: Value,
}

impl TemplateRegistry {
    /// The registry shipped with the service: all four industries, the
    /// enhanced generic template, and the baseline.
    pub fn standard() -> Self {
        let mut industries = BTreeMap::new();
        industries.insert(Industry::HotTubSpa, hot_tub_spa_template());
        industries.insert(Industry::Hvac, hvac_template());
        industries.insert(Industry::Plumbing, plumbing_template());
        industries.insert(Industry::Electrical, electrical_template());
        Self {
            industries,
            enhanced: Some(enhanced_template()),
            baseline: baseline_template(),
        }
    }

    pub fn new(
        industries: BTreeMap<Industry, Value>,
        enhanced: Option<Value>,
        baseline: Value,
    ) -> Self {
        Self {
            industries,
            enhanced,
            baseline,
        }
    }

    pub fn industry_template(&self, industry: Industry) -> Option<&Value> {
        self.industries.get(&industry)
    }

    pub fn enhanced_template(&self) -> Option<&Value> {
        self.enhanced.as_ref()
    }

    pub fn baseline_template(&self) -> &Value {
        &self.baseline
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn triage_switch_node(rules: Value) -> Value {
    json!({
        "id": "triage-switch",
        "name": "Route By Category",
        "type": "n8n-nodes-base.switch",
        "typeVersion": 3,
        "position": [620, 300],
        "parameters": {
            "dataType": "string",
            "value1": "={{ $json.category }}",
            "rules": rules
        }
    })
}

fn gmail_trigger_node() -> Value {
    json!({
        "id": "gmail-trigger",
        "name": "Inbound Email",
        "type": "n8n-nodes-base.gmailTrigger",
        "typeVersion": 1,
        "position": [200, 300],
        "parameters": {
            "simple": false,
            "filters": { "labelIds": ["INBOX"] },
            "options": { "provider": "<<PROVIDER>>" }
        }
    })
}

fn classify_node(system_prompt: &str) -> Value {
    json!({
        "id": "ai-classify",
        "name": "Classify Email",
        "type": "n8n-nodes-base.openAi",
        "typeVersion": 1,
        "position": [420, 300],
        "parameters": {
            "model": "<<AI_MODEL>>",
            "temperature": "<<AI_TEMPERATURE>>",
            "maxTokens": "<<AI_MAX_TOKENS>>",
            "prompt": system_prompt
        }
    })
}

fn draft_reply_node(tone: &str) -> Value {
    json!({
        "id": "ai-draft",
        "name": "Draft Reply",
        "type": "n8n-nodes-base.openAi",
        "typeVersion": 1,
        "position": [840, 300],
        "parameters": {
            "model": "<<AI_MODEL>>",
            "temperature": "<<AI_TEMPERATURE>>",
            "maxTokens": "<<AI_MAX_TOKENS>>",
            "prompt": format!(
                "You draft replies for <<CLIENT_NAME>>. Tone: {tone}. \
                 Escalate anything unclear to <<MANAGER_NAME>> (<<MANAGER_EMAIL>>). \
                 Close every reply with the configured signature: <<SIGNATURE>>"
            )
        }
    })
}

fn label_and_notify_nodes() -> Vec<Value> {
    vec![
        json!({
            "id": "apply-label",
            "name": "Apply Category Label",
            "type": "n8n-nodes-base.gmail",
            "typeVersion": 2,
            "position": [1060, 220],
            "parameters": {
                "operation": "addLabels",
                "labelNames": "={{ $json.labelName }}"
            }
        }),
        json!({
            "id": "notify-manager",
            "name": "Notify Manager",
            "type": "n8n-nodes-base.emailSend",
            "typeVersion": 2,
            "position": [1060, 380],
            "parameters": {
                "toEmail": "<<MANAGER_EMAIL>>",
                "subject": "[<<CLIENT_NAME>>] Escalation: {{ $json.subject }}",
                "text": "Routed category: {{ $json.category }}"
            }
        }),
    ]
}

fn standard_connections() -> Value {
    json!({
        "Inbound Email": { "main": [[{ "node": "Classify Email", "type": "main", "index": 0 }]] },
        "Classify Email": { "main": [[{ "node": "Route By Category", "type": "main", "index": 0 }]] },
        "Route By Category": { "main": [[{ "node": "Draft Reply", "type": "main", "index": 0 }]] },
        "Draft Reply": {
            "main": [[
                { "node": "Apply Category Label", "type": "main", "index": 0 },
                { "node": "Notify Manager", "type": "main", "index": 0 }
            ]]
        }
    })
}

fn workflow_document(name: String, classify_prompt: &str, reply_tone: &str, rules: Value) -> Value {
    let mut nodes = vec![
        gmail_trigger_node(),
        classify_node(classify_prompt),
        triage_switch_node(rules),
        draft_reply_node(reply_tone),
    ];
    nodes.extend(label_and_notify_nodes());
    json!({
        "name": name,
        "meta": {
            "clientId": "<<CLIENT_ID>>",
            "templateVersion": 3,
            "supplierDomains": "<<SUPPLIER_DOMAINS>>"
        },
        "nodes": nodes,
        "connections": standard_connections(),
        "settings": {
            "timezone": "<<TIMEZONE>>",
            "executionOrder": "v1",
            "saveManualExecutions": false
        },
        "active": false
    })
}

fn category_rules(extra: &[(&str, &str)]) -> Value {
    let mut rules: Vec<Value> = [
        "service", "sales", "parts", "warranty", "support", "general",
    ]
    .iter()
    .map(|category| json!({ "value2": category, "output": category }))
    .collect();
    for (value, output) in extra {
        rules.push(json!({ "value2": value, "output": output }));
    }
    json!({ "rules": rules })
}

pub fn hot_tub_spa_template() -> Value {
    workflow_document(
        "<<CLIENT_NAME>> - Hot Tub & Spa Triage".to_string(),
        "Classify this hot tub / spa customer email into one of: service, sales, \
         parts, warranty, support, general. Water chemistry questions are service. \
         Cover and filter purchases are parts.",
        "warm and reassuring; customers are often worried about water quality",
        category_rules(&[("water_care", "service")]),
    )
}

pub fn hvac_template() -> Value {
    workflow_document(
        "<<CLIENT_NAME>> - HVAC Triage".to_string(),
        "Classify this HVAC customer email into one of: service, sales, parts, \
         warranty, support, general. No-heat and no-cooling emergencies are \
         service and must be flagged urgent. Seasonal tune-up requests are sales.",
        "prompt and direct; comfort emergencies need fast scheduling",
        category_rules(&[("emergency", "service")]),
    )
}

pub fn plumbing_template() -> Value {
    workflow_document(
        "<<CLIENT_NAME>> - Plumbing Triage".to_string(),
        "Classify this plumbing customer email into one of: service, sales, parts, \
         warranty, support, general. Active leaks and backups are service and \
         urgent. Fixture upgrade quotes are sales.",
        "calm and practical; emphasize what the customer should shut off first",
        category_rules(&[("emergency", "service")]),
    )
}

pub fn electrical_template() -> Value {
    workflow_document(
        "<<CLIENT_NAME>> - Electrical Triage".to_string(),
        "Classify this electrical customer email into one of: service, sales, \
         parts, warranty, support, general. Sparking, burning smells, and dead \
         panels are service and urgent. Panel upgrade inquiries are sales.",
        "safety-first; never suggest DIY work on live circuits",
        category_rules(&[("safety", "service")]),
    )
}

/// Generic template used when no industry keyword matches. Same pipeline,
/// no trade-specific classification hints.
pub fn enhanced_template() -> Value {
    workflow_document(
        "<<CLIENT_NAME>> - Email Triage".to_string(),
        "Classify this customer email into one of: service, sales, parts, \
         warranty, support, general.",
        "professional and friendly",
        category_rules(&[]),
    )
}

/// Minimal last-resort workflow: label inbound mail, no AI drafting.
pub fn baseline_template() -> Value {
    json!({
        "name": "<<CLIENT_NAME>> - Basic Email Labeling",
        "meta": { "clientId": "<<CLIENT_ID>>", "templateVersion": 3 },
        "nodes": [
            gmail_trigger_node(),
            {
                "id": "apply-label",
                "name": "Apply General Label",
                "type": "n8n-nodes-base.gmail",
                "typeVersion": 2,
                "position": [420, 300],
                "parameters": {
                    "operation": "addLabels",
                    "labelNames": "FloWorx/General"
                }
            }
        ],
        "connections": {
            "Inbound Email": { "main": [[{ "node": "Apply General Label", "type": "main", "index": 0 }]] }
        },
        "settings": { "timezone": "<<TIMEZONE>>", "executionOrder": "v1" },
        "active": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_industry() {
        let registry = TemplateRegistry::standard();
        for industry in Industry::ALL {
            assert!(
                registry.industry_template(industry).is_some(),
                "missing template for {}",
                industry.slug()
            );
        }
        assert!(registry.enhanced_template().is_some());
    }

    #[test]
    fn templates_carry_client_and_timezone_tokens() {
        for doc in [hvac_template(), enhanced_template(), baseline_template()] {
            let text = doc.to_string();
            assert!(text.contains("<<CLIENT_ID>>"));
            assert!(text.contains("<<TIMEZONE>>"));
        }
    }

    #[test]
    fn industry_templates_route_all_six_categories() {
        let doc = plumbing_template();
        let text = doc.to_string();
        for category in ["service", "sales", "parts", "warranty", "support", "general"] {
            assert!(text.contains(category), "missing rule for {category}");
        }
    }
}
