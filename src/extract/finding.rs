//! Raw findings as returned by the backend, before they become issues.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One element of the backend's finding array.
///
/// Every field is optional and lenient: numbers and booleans are stringified,
/// anything else non-string is treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFinding {
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, alias = "original_text", deserialize_with = "lenient_string")]
    pub quote: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub suggestion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
}

impl RawFinding {
    /// Objects become findings; any other array element is dropped.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}
