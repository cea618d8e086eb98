//! Document properties derived from entity metadata
//!
//! Builds the flat property map stored in the search index for containers
//! and objects. User metadata comes from headers carrying the entity's
//! metadata prefix; the prefix is stripped and the key lower-cased.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::entity::{EntityPath, EntityType};
use super::id::{DocumentId, document_id};

/// Entity headers keyed by header name
pub type Headers = BTreeMap<String, String>;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors raised while building documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Only containers and objects are indexed
    #[error("{0} entities are not indexed")]
    UnsupportedEntity(EntityType),

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Indexed representation of a container or object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub path: String,
    pub dir: String,
    pub name: String,
    pub analyzed_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Document {
    /// Top-level fields as a JSON object, the shape the index stores
    pub fn to_fields(&self) -> Result<Map<String, Value>, DocumentError> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }
}

/// Build the id and properties for a container or object
///
/// Headers are matched case-insensitively. A metadata header with an empty
/// value removes that key instead of storing an empty string.
pub fn build_properties(
    path: &EntityPath,
    headers: &Headers,
) -> Result<(DocumentId, Document), DocumentError> {
    let mut doc = match path {
        EntityPath::Account { .. } => {
            return Err(DocumentError::UnsupportedEntity(EntityType::Account));
        }
        EntityPath::Container { account, container } => Document {
            account: account.clone(),
            container: Some(container.clone()),
            path: container.clone(),
            dir: dirname(container).to_string(),
            name: container.clone(),
            analyzed_name: container.clone(),
            entity_type: EntityType::Container,
            object: None,
            hash: None,
            content_type: None,
            read: None,
            write: None,
            meta: BTreeMap::new(),
        },
        EntityPath::Object {
            account,
            container,
            object,
        } => {
            let full_path = format!("{container}/{object}");
            Document {
                account: account.clone(),
                container: Some(container.clone()),
                dir: dirname(&full_path).to_string(),
                path: full_path,
                name: basename(object).to_string(),
                analyzed_name: object.clone(),
                entity_type: EntityType::Object,
                object: Some(object.clone()),
                hash: None,
                content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
                read: None,
                write: None,
                meta: BTreeMap::new(),
            }
        }
    };

    let prefix = doc.entity_type.meta_prefix();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if let Some(key) = name.strip_prefix(prefix) {
            if value.is_empty() {
                doc.meta.remove(key);
            } else {
                doc.meta.insert(key.to_string(), value.clone());
            }
            continue;
        }

        match (doc.entity_type, name.as_str()) {
            (EntityType::Container, "x-container-read") => doc.read = Some(value.clone()),
            (EntityType::Container, "x-container-write") => doc.write = Some(value.clone()),
            (EntityType::Object, "etag") => doc.hash = Some(value.clone()),
            (EntityType::Object, "content-type") => doc.content_type = Some(value.clone()),
            _ => {}
        }
    }

    Ok((document_id(path), doc))
}

/// Directory part of a slash-separated path, POSIX `dirname` rules
pub(crate) fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => "",
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            if trimmed.is_empty() { head } else { trimmed }
        }
    }
}

/// Final component of a slash-separated path, POSIX `basename` rules
pub(crate) fn basename(path: &str) -> &str {
    path.rfind('/').map_or(path, |idx| &path[idx + 1..])
}
