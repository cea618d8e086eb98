//! Result-safe projection of stored documents

use serde_json::{Map, Value};

/// Top-level fields that may be returned to a searcher
pub const RESULT_WHITELIST: [&str; 5] = ["name", "object", "container", "content_type", "type"];

/// Project a stored document into a result row
///
/// Keeps whitelisted top-level fields, flattens `meta.<k>` into `meta_<k>`
/// and displays `analyzed_name` in place of `name` when present.
#[must_use]
pub fn project_for_result(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut projected: Map<String, Value> = fields
        .iter()
        .filter(|(key, _)| RESULT_WHITELIST.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if let Some(Value::Object(meta)) = fields.get("meta") {
        for (key, value) in meta {
            projected.insert(format!("meta_{key}"), value.clone());
        }
    }

    if let Some(analyzed) = fields.get("analyzed_name") {
        projected.insert("name".to_string(), analyzed.clone());
    }

    projected
}
