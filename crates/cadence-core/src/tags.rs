use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Normalize a tags payload into a list of strings.
///
/// Older rows and some remote responses carry tags as a JSON-encoded string
/// rather than an array, so every read from storage or the wire goes through
/// this one parse step. Anything unrecognizable decays to an empty list.
pub fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ Value::Array(_)) => parse_tags(&inner),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Serde adapter for `parse_tags`, used on every `tags` field.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_tags(&value))
}
