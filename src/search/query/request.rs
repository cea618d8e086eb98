//! Search request parameters and query-string parsing

use crate::document::EntityType;

/// Target field meaning "every field"
pub const ALL_FIELDS: &str = "_all";

/// Default page size when the request names none
pub const DEFAULT_LIMIT: usize = 100;

/// A structured search request, scoped to one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub account: String,
    /// `(field, value)` text conditions, in request order
    pub conditions: Vec<(String, String)>,
    pub entity_type: Option<EntityType>,
    /// Directory path, without trailing slash
    pub path: Option<String>,
    pub recursive: bool,
    /// Comma-separated `field [asc|desc]` list
    pub sort: Option<String>,
    pub start: usize,
    pub limit: usize,
    pub marker: Option<String>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            conditions: Vec::new(),
            entity_type: None,
            path: None,
            recursive: true,
            sort: None,
            start: 0,
            limit: DEFAULT_LIMIT,
            marker: None,
        }
    }
}
