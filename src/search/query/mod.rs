//! Search query construction, parsing and execution

pub mod builder;
pub mod execution;
pub mod parsing;
pub mod request;
pub mod results;

pub use builder::{SORT_WHITELIST, SearchQueryBuilder, SortOrder, parse_sort};
pub use execution::{execute_search_query, search};
pub use parsing::split_search_path;
pub use request::{ALL_FIELDS, DEFAULT_LIMIT, SearchRequest};
pub use results::SearchResults;
