//! Query execution against a `SearchBackend`

use tracing::info;

use super::builder::SearchQueryBuilder;
use super::request::SearchRequest;
use super::results::SearchResults;
use crate::document::project_for_result;
use crate::log_search_operation;
use crate::search::backend::SearchBackend;
use crate::search::errors::SearchResult;

/// Run a built query and project each hit into a result row
pub async fn execute_search_query(
    backend: &dyn SearchBackend,
    index: &str,
    builder: &SearchQueryBuilder,
) -> SearchResult<SearchResults> {
    let body = builder.build();
    let request = builder.request();
    info!(account = %request.account, query = %body, "running search");

    let hits = log_search_operation!(backend.search(index, &body).await, request.account)?;

    let results: Vec<_> = hits.hits.iter().map(project_for_result).collect();
    Ok(SearchResults {
        count: results.len(),
        total: hits.total,
        results,
        offset: request.start,
    })
}

/// Convenience wrapper for a parsed request
pub async fn search(
    backend: &dyn SearchBackend,
    index: &str,
    request: SearchRequest,
) -> SearchResult<SearchResults> {
    execute_search_query(backend, index, &SearchQueryBuilder::from_request(request)).await
}
