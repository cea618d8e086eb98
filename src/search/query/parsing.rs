//! Search request parsing from HTTP query parameters and request paths

use super::request::{ALL_FIELDS, DEFAULT_LIMIT, SearchRequest};
use crate::document::EntityType;
use crate::search::errors::{SearchError, SearchResult};

/// Split `/<prefix>/<account>[/<path>]` into account and decoded path
///
/// The path has its trailing slashes removed; an empty path is `None`.
pub fn split_search_path(
    request_path: &str,
    prefix: &str,
) -> SearchResult<(String, Option<String>)> {
    let trimmed = request_path.strip_prefix('/').unwrap_or(request_path);
    let mut parts = trimmed.splitn(3, '/');

    let version = parts.next().unwrap_or_default();
    if !version.eq_ignore_ascii_case(prefix) {
        return Err(SearchError::InvalidRequest(format!(
            "path must start with /{prefix}/"
        )));
    }

    let account = parts
        .next()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SearchError::InvalidRequest("missing account".into()))?;
    let account = decode(account)?;

    let path = match parts.next() {
        Some(raw) => {
            let decoded = decode(raw)?;
            let stripped = decoded.trim_end_matches('/');
            (!stripped.is_empty()).then(|| stripped.to_string())
        }
        None => None,
    };

    Ok((account, path))
}

fn decode(raw: &str) -> SearchResult<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| SearchError::InvalidRequest(format!("bad percent-encoding: {e}")))
}

fn parse_count(name: &str, raw: &str) -> SearchResult<usize> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.trim()
        .parse()
        .map_err(|_| SearchError::InvalidRequest(format!("{name} must be a non-negative integer")))
}

impl SearchRequest {
    /// Build a request from decoded query parameters
    ///
    /// * `q` searches `field` (alias `df`, default every field)
    /// * `q.<field>` adds a per-field condition, `q.meta-x` targets `meta.x`
    /// * `limit`/`rows` (default 100), `start`/`offset` (default 0)
    /// * `type` must be `object`, `container` or empty
    /// * `recursive` is false for `false`, `0` or `f`
    ///
    /// Leading and trailing `*` are stripped from query values.
    pub fn from_query_pairs<I, K, V>(
        account: impl Into<String>,
        path: Option<String>,
        pairs: I,
    ) -> SearchResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = SearchRequest::new(account);
        request.path = path;

        let mut query: Option<String> = None;
        let mut field: Option<String> = None;
        let mut df: Option<String> = None;
        let mut limit = 0usize;
        let mut rows = 0usize;
        let mut start = 0usize;
        let mut offset = 0usize;
        let mut field_conditions = Vec::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "q" => query = Some(value.trim_matches('*').to_string()),
                "field" => field = Some(value.to_string()).filter(|v| !v.is_empty()),
                "df" => df = Some(value.to_string()).filter(|v| !v.is_empty()),
                "limit" => limit = parse_count("limit", value)?,
                "rows" => rows = parse_count("rows", value)?,
                "start" => start = parse_count("start", value)?,
                "offset" => offset = parse_count("offset", value)?,
                "sort" => request.sort = Some(value.to_string()).filter(|v| !v.is_empty()),
                "marker" => request.marker = Some(value.to_string()).filter(|v| !v.is_empty()),
                "recursive" => {
                    request.recursive =
                        !["false", "0", "f"].contains(&value.to_ascii_lowercase().as_str());
                }
                "type" => {
                    request.entity_type = match value {
                        "" => None,
                        "object" => Some(EntityType::Object),
                        "container" => Some(EntityType::Container),
                        other => {
                            return Err(SearchError::InvalidRequest(format!(
                                "type must be object or container, got '{other}'"
                            )));
                        }
                    };
                }
                _ => {
                    if let Some(target) = key.strip_prefix("q.") {
                        let target = match target.strip_prefix("meta-") {
                            Some(meta) => format!("meta.{meta}"),
                            None => target.to_string(),
                        };
                        field_conditions.push((target, value.trim_matches('*').to_string()));
                    }
                }
            }
        }

        request.limit = match (limit, rows) {
            (0, 0) => DEFAULT_LIMIT,
            (0, rows) => rows,
            (limit, _) => limit,
        };
        request.start = if start > 0 { start } else { offset };

        if let Some(q) = query.filter(|q| !q.is_empty()) {
            let target = field.or(df).unwrap_or_else(|| ALL_FIELDS.to_string());
            request.conditions.push((target, q));
        }
        request.conditions.extend(field_conditions);

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pairs: &[(&str, &str)]) -> SearchResult<SearchRequest> {
        SearchRequest::from_query_pairs("AUTH_a", None, pairs.iter().copied())
    }

    #[test]
    fn test_defaults() {
        let req = parse(&[]).expect("parse");
        assert_eq!(req.limit, 100);
        assert_eq!(req.start, 0);
        assert!(req.recursive);
        assert!(req.conditions.is_empty());
    }

    #[test]
    fn test_query_and_field_conditions() {
        let req = parse(&[
            ("q.meta-color", "*orange*"),
            ("q", "*cat*"),
            ("df", "name"),
            ("q.container", "photos"),
        ])
        .expect("parse");
        assert_eq!(
            req.conditions,
            vec![
                ("name".to_string(), "cat".to_string()),
                ("meta.color".to_string(), "orange".to_string()),
                ("container".to_string(), "photos".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_defaults_to_all_fields() {
        let req = parse(&[("q", "cat")]).expect("parse");
        assert_eq!(req.conditions, vec![("_all".to_string(), "cat".to_string())]);
    }

    #[test]
    fn test_rows_and_offset_aliases() {
        let req = parse(&[("rows", "25"), ("offset", "50")]).expect("parse");
        assert_eq!(req.limit, 25);
        assert_eq!(req.start, 50);

        let req = parse(&[("limit", "0"), ("rows", "0")]).expect("parse");
        assert_eq!(req.limit, 100);
    }

    #[test]
    fn test_recursive_flag() {
        for off in ["false", "0", "f", "FALSE", "F"] {
            assert!(!parse(&[("recursive", off)]).expect("parse").recursive, "{off}");
        }
        assert!(parse(&[("recursive", "yes")]).expect("parse").recursive);
    }

    #[test]
    fn test_type_validation() {
        assert_eq!(
            parse(&[("type", "object")]).expect("parse").entity_type,
            Some(EntityType::Object)
        );
        assert_eq!(parse(&[("type", "")]).expect("parse").entity_type, None);
        assert!(matches!(
            parse(&[("type", "account")]),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_bad_limit_is_rejected() {
        assert!(matches!(
            parse(&[("limit", "ten")]),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_split_search_path() {
        let (account, path) = split_search_path("/search/AUTH_a/photos/2024%20trip/", "search")
            .expect("split");
        assert_eq!(account, "AUTH_a");
        assert_eq!(path.as_deref(), Some("photos/2024 trip"));

        let (_, path) = split_search_path("/search/AUTH_a", "search").expect("split");
        assert_eq!(path, None);

        assert!(split_search_path("/v1/AUTH_a", "search").is_err());
        assert!(split_search_path("/search/", "search").is_err());
    }
}
