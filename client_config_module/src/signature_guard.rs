//! Guardrail for custom reply signatures.
//!
//! While signatures are locked, a custom signature must not claim to be
//! from one of the client's managers. Matching is case-insensitive, on
//! word boundaries, and tolerant of whitespace between name parts, so
//! "dana   reyes" trips the guard but "Danae Reyes-Smith" does not.

use regex::Regex;

use crate::client_config::Manager;

/// Compile a whole-name matcher for one manager. Returns `None` for blank
/// names or names regex cannot express (the entry is then simply skipped).
pub fn name_pattern(name: &str) -> Option<Regex> {
    let parts: Vec<String> = name.split_whitespace().map(regex::escape).collect();
    if parts.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)\b{}\b", parts.join(r"\s+"));
    Regex::new(&pattern).ok()
}

/// Find the first manager whose name appears in `text`.
pub fn find_locked_name<'a>(text: &str, managers: &'a [Manager]) -> Option<&'a str> {
    managers
        .iter()
        .filter(|manager| !manager.name.trim().is_empty())
        .find(|manager| {
            name_pattern(&manager.name)
                .map(|pattern| pattern.is_match(text))
                .unwrap_or(false)
        })
        .map(|manager| manager.name.as_str())
}
