//! Parse "change to" directives out of issue suggestions.

use regex::Regex;
use std::sync::LazyLock;

static CHANGE_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)change\s+to:?\s*(?:'(.*?)'|"(.*?)"|“(.*?)”|‘(.*?)’)"#).unwrap()
});

/// The replacement text in `Change to: 'new text'`, or `None` when the
/// suggestion carries no usable directive.
///
/// Case-insensitive; the colon is optional; straight or typographic quotes.
/// An empty replacement is not a directive.
pub fn parse_change_to(suggestion: &str) -> Option<String> {
    let caps = CHANGE_TO.captures(suggestion)?;
    (1..=4)
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}
