//! Recover a finding list from noisy backend output.
//!
//! Tiers, in order:
//! 1. the response parses as-is
//! 2. the whole response is wrapped in a code fence; strip it
//! 3. the first balanced `[...]` literal that parses
//!
//! At every tier a top-level object carrying the list under a known key
//! (`findings` or `issues` for review findings) is accepted in place of a bare
//! array.

use serde_json::Value;

/// Parse a list of findings from `response`, or `None` when nothing usable
/// is present.
pub fn parse_finding_array(response: &str) -> Option<Vec<Value>> {
    parse_json_list(response, &["findings", "issues"])
}

/// Parse a JSON list from `response`, also accepting an object that holds
/// the list under one of `keys`.
pub fn parse_json_list(response: &str, keys: &[&str]) -> Option<Vec<Value>> {
    let trimmed = response.trim();

    if let Some(list) = parse_list(trimmed, keys) {
        return Some(list);
    }
    if let Some(inner) = strip_fence(trimmed)
        && let Some(list) = parse_list(inner, keys)
    {
        return Some(list);
    }
    find_balanced_array(trimmed)
}

fn parse_list(text: &str, keys: &[&str]) -> Option<Vec<Value>> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| into_list(value, keys))
}

fn into_list(value: Value, keys: &[&str]) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => keys
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        _ => None,
    }
}

/// Body of a response that is entirely one fenced block (```` ```json ... ``` ````).
pub fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body = rest.strip_suffix("```")?;
    // Drop the info string ("json") on the opening line.
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    };
    Some(body.trim())
}

/// Try each `[` in turn; return the first balanced array that parses.
fn find_balanced_array(text: &str) -> Option<Vec<Value>> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('[') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(text, start)
            && let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text[start..end])
        {
            return Some(items);
        }
        search_from = start + 1;
    }
    None
}

/// Byte offset just past the `]` that closes the `[` at `start`.
///
/// Brackets inside JSON strings, including escaped quotes, are ignored.
pub fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
