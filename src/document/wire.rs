//! NDJSON bulk commands carried on the river queue

use serde_json::json;

use super::id::DocumentId;
use super::properties::{Document, DocumentError};

/// Mapping type every command targets
pub const DOCUMENT_TYPE: &str = "entity";

/// A single bulk command for the search engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    /// Insert or replace a document
    Upsert {
        index: String,
        id: DocumentId,
        document: Document,
    },
    /// Remove a document
    Delete { index: String, id: DocumentId },
}

impl WireCommand {
    pub fn upsert(index: impl Into<String>, id: DocumentId, document: Document) -> Self {
        Self::Upsert {
            index: index.into(),
            id,
            document,
        }
    }

    pub fn delete(index: impl Into<String>, id: DocumentId) -> Self {
        Self::Delete {
            index: index.into(),
            id,
        }
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        match self {
            Self::Upsert { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Render the command body, each line newline-terminated
    ///
    /// Upserts produce an action line followed by the document; deletes
    /// produce the action line only.
    pub fn to_ndjson(&self) -> Result<String, DocumentError> {
        match self {
            Self::Upsert {
                index,
                id,
                document,
            } => {
                let action = json!({
                    "index": { "_index": index, "_type": DOCUMENT_TYPE, "_id": id }
                });
                Ok(format!(
                    "{}\n{}\n",
                    serde_json::to_string(&action)?,
                    serde_json::to_string(document)?
                ))
            }
            Self::Delete { index, id } => {
                let action = json!({
                    "delete": { "_index": index, "_type": DOCUMENT_TYPE, "_id": id }
                });
                Ok(format!("{}\n", serde_json::to_string(&action)?))
            }
        }
    }
}
