//! Response rendering for search results

use serde_json::Value;

use super::errors::SearchResult;
use super::query::SearchResults;

pub const HEADER_ITEMS_COUNT: &str = "X-Search-Items-Count";
pub const HEADER_ITEMS_TOTAL: &str = "X-Search-Items-Total";
pub const HEADER_ITEMS_OFFSET: &str = "X-Search-Items-Offset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    Json,
    Xml,
    #[default]
    Plain,
}

impl ResponseFormat {
    /// Pick a format from the `format` parameter, falling back to `Accept`
    #[must_use]
    pub fn negotiate(format_param: Option<&str>, accept: Option<&str>) -> Self {
        let param = format_param.unwrap_or_default().to_ascii_lowercase();
        match param.as_str() {
            "json" => return Self::Json,
            "xml" => return Self::Xml,
            "" => {}
            _ => return Self::Plain,
        }

        let accept = accept.unwrap_or_default().to_ascii_lowercase();
        if accept.contains("json") {
            Self::Json
        } else if accept.contains("xml") {
            Self::Xml
        } else {
            Self::Plain
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
            Self::Plain => "text/plain",
        }
    }
}

/// A rendered response body with its headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether `key` can be used verbatim as an XML element name
fn is_xml_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// One result field as XML; keys that are not valid names become `<field name="...">`
fn xml_field(key: &str, value: &Value) -> String {
    let text = html_escape::encode_text(&display_value(value)).into_owned();
    if is_xml_name(key) {
        format!("<{key}>{text}</{key}>")
    } else {
        format!(
            r#"<field name="{}">{text}</field>"#,
            html_escape::encode_double_quoted_attribute(key)
        )
    }
}

/// Render a result page in `format`
pub fn render(results: &SearchResults, format: ResponseFormat) -> SearchResult<RenderedResponse> {
    let body = match format {
        ResponseFormat::Json => serde_json::to_string(&results.results)?,
        ResponseFormat::Xml => {
            let mut lines = vec![
                r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
                "<results>".to_string(),
            ];
            for row in &results.results {
                let mut item = String::from("<object>");
                for (key, value) in row {
                    item.push_str(&xml_field(key, value));
                }
                item.push_str("</object>");
                lines.push(item);
            }
            lines.push("</results>".to_string());
            lines.join("\n")
        }
        ResponseFormat::Plain => {
            let mut out = String::new();
            for row in &results.results {
                for (key, value) in row {
                    out.push_str(&format!("{key}: {}\n", display_value(value)));
                }
                out.push('\n');
            }
            out
        }
    };

    let headers = vec![
        (HEADER_ITEMS_COUNT.to_string(), results.count.to_string()),
        (HEADER_ITEMS_TOTAL.to_string(), results.total.to_string()),
        (HEADER_ITEMS_OFFSET.to_string(), results.offset.to_string()),
        ("Content-Type".to_string(), format.content_type().to_string()),
    ];

    Ok(RenderedResponse { headers, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn page() -> SearchResults {
        let mut row = Map::new();
        row.insert("name".into(), json!("a<b>&c"));
        row.insert("type".into(), json!("object"));
        SearchResults {
            count: 1,
            total: 9,
            results: vec![row],
            offset: 4,
        }
    }

    #[test]
    fn test_negotiation() {
        assert_eq!(ResponseFormat::negotiate(Some("JSON"), None), ResponseFormat::Json);
        assert_eq!(
            ResponseFormat::negotiate(None, Some("application/xml")),
            ResponseFormat::Xml
        );
        assert_eq!(
            ResponseFormat::negotiate(Some("plain"), Some("application/json")),
            ResponseFormat::Plain
        );
        assert_eq!(ResponseFormat::negotiate(None, None), ResponseFormat::Plain);
    }

    #[test]
    fn test_xml_is_escaped() {
        let rendered = render(&page(), ResponseFormat::Xml).expect("render");
        assert!(rendered.body.contains("<name>a&lt;b&gt;&amp;c</name>"));
        assert!(rendered.body.starts_with("<?xml"));
        assert!(rendered.body.ends_with("</results>"));
    }

    #[test]
    fn test_xml_keys_that_are_not_names_become_attributes() {
        let mut row = Map::new();
        row.insert("meta_color".into(), json!("grey"));
        row.insert("meta_a&b'c".into(), json!("x"));
        row.insert("meta_1 2".into(), json!("y"));
        let results = SearchResults {
            count: 1,
            total: 1,
            results: vec![row],
            offset: 0,
        };

        let body = render(&results, ResponseFormat::Xml).expect("render").body;
        assert!(body.contains("<meta_color>grey</meta_color>"));
        assert!(body.contains(r#"<field name="meta_a&amp;b'c">x</field>"#));
        assert!(body.contains(r#"<field name="meta_1 2">y</field>"#));
        assert!(!body.contains("<meta_a&"));
    }

    #[test]
    fn test_headers_and_plain_body() {
        let rendered = render(&page(), ResponseFormat::Plain).expect("render");
        assert_eq!(rendered.body, "name: a<b>&c\ntype: object\n\n");
        assert!(rendered
            .headers
            .contains(&("X-Search-Items-Total".to_string(), "9".to_string())));
        assert!(rendered
            .headers
            .contains(&("X-Search-Items-Offset".to_string(), "4".to_string())));
    }

    #[test]
    fn test_json_body() {
        let rendered = render(&page(), ResponseFormat::Json).expect("render");
        let parsed: Value = serde_json::from_str(&rendered.body).expect("json");
        assert_eq!(parsed[0]["type"], "object");
    }
}
