//! Verify mode: compare what the index holds with what would be written

use serde_json::{Map, Value, json};
use tracing::error;

use super::errors::BackfillError;
use crate::document::{Document, DocumentId};
use crate::search::{SearchBackend, SearchError};

/// One stored field that differs from its recomputed value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMismatch {
    pub field: String,
    pub indexed: Value,
    /// `None` when the fresh document lacks the field entirely
    pub computed: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub id: DocumentId,
    pub mismatches: Vec<FieldMismatch>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare every stored field against the recomputed fields
#[must_use]
pub fn compare_fields(
    id: DocumentId,
    indexed: &Map<String, Value>,
    computed: &Map<String, Value>,
) -> VerifyReport {
    let mismatches = indexed
        .iter()
        .filter(|(name, value)| computed.get(name.as_str()) != Some(*value))
        .map(|(name, value)| FieldMismatch {
            field: name.clone(),
            indexed: value.clone(),
            computed: computed.get(name.as_str()).cloned(),
        })
        .collect();
    VerifyReport { id, mismatches }
}

/// Look the document up by id and compare it with `document`
///
/// The index is never written.
pub async fn verify_document(
    search: &dyn SearchBackend,
    index: &str,
    id: DocumentId,
    document: &Document,
) -> Result<VerifyReport, BackfillError> {
    let query = json!({
        "query": { "ids": { "values": [id.as_str()] } },
        "size": 2,
    });
    let hits = search.search(index, &query).await?;
    if hits.total != 1 {
        return Err(BackfillError::VerifyHitCount {
            id: id.to_string(),
            found: hits.total,
        });
    }

    let indexed = hits.hits.into_iter().next().ok_or_else(|| {
        SearchError::MalformedResponse(format!("hit for {id} carries no stored fields"))
    })?;
    let report = compare_fields(id, &indexed, &document.to_fields()?);
    for mismatch in &report.mismatches {
        error!(
            id = %report.id,
            field = %mismatch.field,
            indexed = %mismatch.indexed,
            computed = ?mismatch.computed,
            "indexed property does not match"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::{EntityPath, Headers, build_properties};
    use crate::search::SearchHits;
    use crate::search::errors::SearchResult;

    /// Engine that counts a hit but returns no `_source`
    struct SourcelessHit;

    #[async_trait]
    impl SearchBackend for SourcelessHit {
        async fn search(&self, _index: &str, _body: &Value) -> SearchResult<SearchHits> {
            Ok(SearchHits {
                total: 1,
                hits: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_hit_without_source_is_malformed() {
        let path = EntityPath::container("AUTH_a", "photos");
        let (id, document) = build_properties(&path, &Headers::new()).expect("document");
        let err = verify_document(&SourcelessHit, "os_default", id, &document)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackfillError::Search(SearchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_compare_reports_changed_and_missing_fields() {
        let indexed = json!({ "name": "a", "hash": "old", "stale": 1 });
        let computed = json!({ "name": "a", "hash": "new" });
        let report = compare_fields(
            DocumentId::for_parts("A", Some("c"), None),
            indexed.as_object().expect("object"),
            computed.as_object().expect("object"),
        );

        assert!(!report.is_clean());
        let fields: Vec<&str> = report.mismatches.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["hash", "stale"]);
        assert_eq!(report.mismatches[1].computed, None);
    }

    #[test]
    fn test_identical_documents_are_clean() {
        let fields = json!({ "name": "a" });
        let map = fields.as_object().expect("object");
        assert!(compare_fields(DocumentId::for_parts("A", None, None), map, map).is_clean());
    }
}
