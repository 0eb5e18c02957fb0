//! Mailbox discovery and idempotent label provisioning.
//!
//! Provisioning diffs the provider's labels against the canonical
//! taxonomy and creates only what is missing, parent before children.
//! Individual create failures do not abort the batch; they are collected
//! so callers can persist the successes and report the rest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::labels::{LabelProvider, MailboxError};
use crate::taxonomy::{Category, PARENT_LABEL};

/// A provider label with its parent derived from the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelNode {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// One category resolved to a concrete provider label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMapping {
    pub category: Category,
    pub gmail_label_id: String,
    pub gmail_label_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredMailbox {
    pub labels: Vec<LabelNode>,
    pub suggested_mapping: Vec<CategoryMapping>,
}

/// A label the provider refused to create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelFailure {
    pub label: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub created: Vec<String>,
    pub errors: Vec<LabelFailure>,
    pub mapping: Vec<CategoryMapping>,
}

impl ProvisionOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.mapping.len() == Category::ALL.len()
    }
}

/// List the mailbox's labels and suggest a category mapping.
///
/// For each category the exact canonical path wins; otherwise the first
/// label whose terminal path segment equals the category name is
/// suggested. Categories with no candidate are omitted.
pub async fn discover(provider: &dyn LabelProvider) -> Result<DiscoveredMailbox, MailboxError> {
    let labels = provider.list_labels().await?;

    let nodes: Vec<LabelNode> = labels
        .iter()
        .map(|label| LabelNode {
            id: label.id.clone(),
            name: label.name.clone(),
            parent: label.parent().map(|p| p.to_string()),
        })
        .collect();

    let mut suggested = Vec::new();
    for category in Category::ALL {
        let canonical = category.label_path();
        let candidate = labels
            .iter()
            .find(|label| label.name == canonical)
            .or_else(|| {
                labels
                    .iter()
                    .find(|label| category.matches_segment(label.terminal_segment()))
            });
        if let Some(label) = candidate {
            suggested.push(CategoryMapping {
                category,
                gmail_label_id: label.id.clone(),
                gmail_label_name: label.name.clone(),
            });
        }
    }

    Ok(DiscoveredMailbox {
        labels: nodes,
        suggested_mapping: suggested,
    })
}

/// Ensure the canonical hierarchy exists, creating missing labels.
///
/// Rerunning against a complete mailbox creates nothing and returns the
/// full mapping. A failed create is recorded per label; the rest of the
/// batch still runs. Failing to list labels at all is fatal.
pub async fn provision(provider: &dyn LabelProvider) -> Result<ProvisionOutcome, MailboxError> {
    let labels = provider.list_labels().await?;
    let mut by_name: HashMap<String, String> = labels
        .into_iter()
        .map(|label| (label.name, label.id))
        .collect();

    let mut created = Vec::new();
    let mut errors = Vec::new();
    let mut mapping = Vec::new();

    // The parent label must exist before any nested path can be created.
    let parent_available = if by_name.contains_key(PARENT_LABEL) {
        true
    } else {
        match provider.create_label(PARENT_LABEL).await {
            Ok(label) => {
                info!("created parent label '{}'", label.name);
                created.push(label.name.clone());
                by_name.insert(label.name, label.id);
                true
            }
            Err(err) => {
                warn!("failed to create parent label '{}': {}", PARENT_LABEL, err);
                errors.push(LabelFailure {
                    label: PARENT_LABEL.to_string(),
                    message: err.to_string(),
                });
                false
            }
        }
    };

    for category in Category::ALL {
        let path = category.label_path();
        if let Some(id) = by_name.get(&path) {
            mapping.push(CategoryMapping {
                category,
                gmail_label_id: id.clone(),
                gmail_label_name: path,
            });
            continue;
        }
        if !parent_available {
            errors.push(LabelFailure {
                label: path,
                message: format!("parent label '{PARENT_LABEL}' is unavailable"),
            });
            continue;
        }
        match provider.create_label(&path).await {
            Ok(label) => {
                info!("created label '{}' ({})", label.name, label.id);
                created.push(label.name.clone());
                mapping.push(CategoryMapping {
                    category,
                    gmail_label_id: label.id.clone(),
                    gmail_label_name: label.name.clone(),
                });
                by_name.insert(label.name, label.id);
            }
            Err(err) => {
                warn!("failed to create label '{}': {}", path, err);
                errors.push(LabelFailure {
                    label: path,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(ProvisionOutcome {
        created,
        errors,
        mapping,
    })
}
