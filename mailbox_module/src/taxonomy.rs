//! The canonical mailbox taxonomy.
//!
//! Every client mailbox gets the same six triage categories, provisioned
//! as labels nested under a single parent so they stay grouped in the
//! provider's sidebar.

use serde::{Deserialize, Serialize};

/// Parent label holding the whole hierarchy. Must exist before any
/// category label can be created.
pub const PARENT_LABEL: &str = "FloWorx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Service,
    Sales,
    Parts,
    Warranty,
    Support,
    General,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Service,
        Category::Sales,
        Category::Parts,
        Category::Warranty,
        Category::Support,
        Category::General,
    ];

    /// Lowercase key used in config documents and API payloads.
    pub fn key(&self) -> &'static str {
        match self {
            Category::Service => "service",
            Category::Sales => "sales",
            Category::Parts => "parts",
            Category::Warranty => "warranty",
            Category::Support => "support",
            Category::General => "general",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Service => "Service",
            Category::Sales => "Sales",
            Category::Parts => "Parts",
            Category::Warranty => "Warranty",
            Category::Support => "Support",
            Category::General => "General",
        }
    }

    /// Full label path under the parent, e.g. `FloWorx/Service`.
    pub fn label_path(&self) -> String {
        format!("{}/{}", PARENT_LABEL, self.display_name())
    }

    pub fn from_key(raw: &str) -> Option<Category> {
        let normalized = raw.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.key() == normalized)
    }

    /// Match a label path's terminal segment against a category name,
    /// case-insensitively. `Team/Old Sales` does not match; `Team/Sales`
    /// does.
    pub fn matches_segment(&self, segment: &str) -> bool {
        segment.trim().eq_ignore_ascii_case(self.display_name())
    }
}
