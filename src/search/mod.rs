//! Search over the object index
//!
//! Builds account-scoped query DSL from structured requests, executes it
//! against a search engine and renders projected result rows.

pub mod backend;
pub mod errors;
pub mod format;
pub mod query;

pub use backend::{ElasticBackend, SearchBackend, SearchHits, parse_hits};
pub use errors::{RetryConfig, SearchError, SearchResult};
pub use format::{RenderedResponse, ResponseFormat, render};
pub use query::{
    SearchQueryBuilder, SearchRequest, SearchResults, execute_search_query, search,
    split_search_path,
};
