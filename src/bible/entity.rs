//! Canonical-fact entities and their lenient parse boundary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::extract::lenient_string;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "age")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "text")]
    pub physical_description: String,
    #[serde(default, deserialize_with = "text")]
    pub occupation: String,
    #[serde(default, deserialize_with = "list")]
    pub personality_traits: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    pub speech_patterns: String,
    #[serde(default, deserialize_with = "text")]
    pub arc_notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "text")]
    pub atmosphere: String,
    #[serde(default, deserialize_with = "list")]
    pub key_features: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default, deserialize_with = "text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub day_of_week: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub event: String,
    #[serde(default, deserialize_with = "text")]
    pub chapter_reference: String,
}

/// A plot-significant object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryObject {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub significance: String,
}

/// Parse one array element, dropping non-objects and entries that fail `keep`.
pub(crate) fn parse_entity<T>(value: Value, keep: impl Fn(&T) -> bool) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
{
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok().filter(|e| keep(e))
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

/// `35`, `35.0` or `"35 (chapter 1)"`; anything without digits is unknown.
fn age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u32),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    })
}

/// A JSON array of strings, or one comma-separated string.
fn list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<String> = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
