//! Keyword-driven industry selection with a deterministic fallback chain.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::templates::{Industry, TemplateRegistry, TemplateTier};

/// Keyword table in registration order. Order matters: when two matching
/// keywords have the same length, the earlier registration wins.
const KEYWORDS: [(&str, Industry); 18] = [
    ("hot tub", Industry::HotTubSpa),
    ("spa", Industry::HotTubSpa),
    ("jacuzzi", Industry::HotTubSpa),
    ("sauna", Industry::HotTubSpa),
    ("hvac", Industry::Hvac),
    ("furnace", Industry::Hvac),
    ("air conditioning", Industry::Hvac),
    ("heat pump", Industry::Hvac),
    ("heating", Industry::Hvac),
    ("cooling", Industry::Hvac),
    ("plumbing", Industry::Plumbing),
    ("plumber", Industry::Plumbing),
    ("drain", Industry::Plumbing),
    ("water heater", Industry::Plumbing),
    ("electrical", Industry::Electrical),
    ("electrician", Industry::Electrical),
    ("wiring", Industry::Electrical),
    ("panel upgrade", Industry::Electrical),
];

static KEYWORD_PATTERNS: LazyLock<Vec<(Regex, &'static str, Industry)>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .filter_map(|(keyword, industry)| {
            let escaped = keyword
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            Regex::new(&format!(r"(?i)\b{escaped}\b"))
                .ok()
                .map(|pattern| (pattern, *keyword, *industry))
        })
        .collect()
});

/// Match business descriptors against the keyword table.
///
/// Keywords hit on whole-word (or whole-phrase) boundaries only, so
/// "sparse" never matches "spa". The longest matching keyword decides the
/// industry; equal lengths fall back to registration order.
pub fn match_industry(descriptors: &[&str]) -> Option<Industry> {
    let haystack = descriptors.join(" ");
    let mut best: Option<(usize, &str, Industry)> = None;
    for (pattern, keyword, industry) in KEYWORD_PATTERNS.iter() {
        if !pattern.is_match(&haystack) {
            continue;
        }
        let better = match best {
            Some((len, _, _)) => keyword.len() > len,
            None => true,
        };
        if better {
            best = Some((keyword.len(), keyword, *industry));
        }
    }
    best.map(|(_, keyword, industry)| {
        debug!("industry keyword '{}' matched: {}", keyword, industry.slug());
        industry
    })
}

/// A workflow document picked for a client, before parameterization.
#[derive(Debug, Clone)]
pub struct SelectedWorkflow {
    pub industry: Option<Industry>,
    pub tier: TemplateTier,
    pub document: Value,
}

/// Pick the workflow for the given descriptors.
///
/// Chain: matched industry template, then the enhanced generic template,
/// then the baseline. A workflow is always returned.
pub fn select_workflow(registry: &TemplateRegistry, descriptors: &[&str]) -> SelectedWorkflow {
    let industry = match_industry(descriptors);
    if let Some(industry) = industry {
        if let Some(document) = registry.industry_template(industry) {
            return SelectedWorkflow {
                industry: Some(industry),
                tier: TemplateTier::Industry,
                document: document.clone(),
            };
        }
        debug!(
            "no template registered for {}, falling back",
            industry.slug()
        );
    }
    if let Some(document) = registry.enhanced_template() {
        return SelectedWorkflow {
            industry,
            tier: TemplateTier::Enhanced,
            document: document.clone(),
        };
    }
    SelectedWorkflow {
        industry,
        tier: TemplateTier::Baseline,
        document: registry.baseline_template().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::baseline_template;
    use std::collections::BTreeMap;

    #[test]
    fn furnace_matches_hvac() {
        assert_eq!(
            match_industry(&["Acme Furnace Repair"]),
            Some(Industry::Hvac)
        );
    }

    #[test]
    fn keywords_require_word_boundaries() {
        assert_eq!(match_industry(&["Sparse Consulting"]), None);
        assert_eq!(match_industry(&["Desert Spa Retreat"]), Some(Industry::HotTubSpa));
    }

    #[test]
    fn multi_word_keywords_match_across_whitespace() {
        assert_eq!(
            match_industry(&["Valley Air  Conditioning"]),
            Some(Industry::Hvac)
        );
    }

    #[test]
    fn longest_keyword_wins() {
        // "electrical" (10) beats "hot tub" (7) and "wiring" (6).
        assert_eq!(
            match_industry(&["electrical hot tub wiring"]),
            Some(Industry::Electrical)
        );
    }

    #[test]
    fn equal_length_ties_resolve_by_registration_order() {
        // "sauna" and "drain" are both five characters; sauna registers first.
        assert_eq!(
            match_industry(&["sauna drain cleaning"]),
            Some(Industry::HotTubSpa)
        );
    }

    #[test]
    fn no_match_selects_enhanced() {
        let registry = TemplateRegistry::standard();
        let selected = select_workflow(&registry, &["Acme Corp"]);
        assert_eq!(selected.tier, TemplateTier::Enhanced);
        assert!(selected.industry.is_none());
    }

    #[test]
    fn matched_industry_selects_industry_tier() {
        let registry = TemplateRegistry::standard();
        let selected = select_workflow(&registry, &["Riverside Plumbing"]);
        assert_eq!(selected.tier, TemplateTier::Industry);
        assert_eq!(selected.industry, Some(Industry::Plumbing));
    }

    #[test]
    fn chain_falls_through_to_baseline() {
        let registry = TemplateRegistry::new(BTreeMap::new(), None, baseline_template());
        let selected = select_workflow(&registry, &["Riverside Plumbing"]);
        assert_eq!(selected.tier, TemplateTier::Baseline);
        // The keyword match is still reported even when its template is absent.
        assert_eq!(selected.industry, Some(Industry::Plumbing));
    }
}
