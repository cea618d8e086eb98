//! Query builder producing search-engine query DSL with a fluent interface

use serde_json::{Map, Value, json};

use super::request::{ALL_FIELDS, SearchRequest};
use crate::document::EntityType;

/// Fields a result set may be sorted on
pub const SORT_WHITELIST: [&str; 5] = ["dir", "container", "name", "path", "type"];

/// Sort direction of one sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Parse `"name desc, path"` into whitelisted sort keys
///
/// Unknown fields are ignored; any direction other than `desc`
/// (case-insensitive) sorts ascending.
#[must_use]
pub fn parse_sort(spec: &str) -> Vec<(String, SortOrder)> {
    spec.split(',')
        .filter_map(|row| {
            let mut parts = row.split_whitespace();
            let field = parts.next()?;
            if !SORT_WHITELIST.contains(&field) {
                return None;
            }
            let order = match parts.next() {
                Some(dir) if dir.eq_ignore_ascii_case("desc") => SortOrder::Desc,
                _ => SortOrder::Asc,
            };
            Some((field.to_string(), order))
        })
        .collect()
}

/// Search query builder with fluent interface
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    request: SearchRequest,
}

impl SearchQueryBuilder {
    /// Create a builder scoped to `account`
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            request: SearchRequest::new(account),
        }
    }

    /// Start from an already parsed request
    #[must_use]
    pub fn from_request(request: SearchRequest) -> Self {
        Self { request }
    }

    /// Add a text condition; `_all` targets every field
    #[must_use]
    pub fn condition(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.conditions.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.request.entity_type = Some(entity_type);
        self
    }

    /// Restrict to a directory, recursively or to its direct children
    #[must_use]
    pub fn path(mut self, path: impl Into<String>, recursive: bool) -> Self {
        self.request.path = Some(path.into());
        self.request.recursive = recursive;
        self
    }

    #[must_use]
    pub fn sort(mut self, spec: impl Into<String>) -> Self {
        self.request.sort = Some(spec.into());
        self
    }

    #[must_use]
    pub fn start(mut self, start: usize) -> Self {
        self.request.start = start;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.request.limit = limit;
        self
    }

    /// Only names strictly after `marker`
    #[must_use]
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.request.marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Render the request body
    #[must_use]
    pub fn build(&self) -> Value {
        let req = &self.request;

        let mut filter = vec![json!({ "term": { "account": req.account } })];
        let mut must: Vec<Value> = req
            .conditions
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(field, value)| text_clause(field, value))
            .collect();

        if let Some(entity_type) = req.entity_type {
            filter.push(json!({ "term": { "type": entity_type.as_str() } }));
        }

        if let Some(path) = req.path.as_deref().filter(|p| !p.is_empty()) {
            if req.recursive {
                filter.push(json!({ "prefix": { "path": format!("{path}/") } }));
            } else {
                filter.push(json!({ "term": { "dir": path } }));
            }
        }

        if let Some(marker) = req.marker.as_deref().filter(|m| !m.is_empty()) {
            filter.push(json!({ "range": { "name": { "gt": marker } } }));
        }

        if must.is_empty() {
            must.push(json!({ "match_all": {} }));
        }

        let mut body = Map::new();
        body.insert(
            "query".into(),
            json!({ "bool": { "must": must, "filter": filter } }),
        );
        body.insert("from".into(), json!(req.start));
        body.insert("size".into(), json!(req.limit));

        let sort: Vec<Value> = req
            .sort
            .as_deref()
            .map(parse_sort)
            .unwrap_or_default()
            .into_iter()
            .map(|(field, order)| json!({ field: { "order": order.as_str() } }))
            .collect();
        if !sort.is_empty() {
            body.insert("sort".into(), Value::Array(sort));
        }

        Value::Object(body)
    }
}

fn text_clause(field: &str, value: &str) -> Value {
    if field == ALL_FIELDS {
        json!({ "multi_match": { "query": value, "fields": ["*"] } })
    } else {
        json!({ "match": { field: value } })
    }
}
