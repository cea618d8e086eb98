use std::time::Duration;

use mockito::Matcher;
use search_river::config::IndexConfig;
use search_river::search::{
    ResponseFormat, SearchError, SearchRequest, render, search, split_search_path,
};
use search_river::ElasticBackend;
use serde_json::json;

const HITS: &str = r#"{
    "hits": {
        "total": { "value": 7, "relation": "eq" },
        "hits": [
            { "_id": "1", "_source": {
                "account": "AUTH_a", "container": "photos", "path": "photos/2024/cat.jpg",
                "dir": "photos/2024", "name": "cat.jpg", "analyzed_name": "2024/cat.jpg",
                "type": "object", "object": "2024/cat.jpg", "hash": "abc",
                "content_type": "image/jpeg", "meta": { "color": "grey" }
            } },
            { "_id": "2", "_source": {
                "account": "AUTH_a", "container": "photos", "path": "photos/2024/dog.jpg",
                "dir": "photos/2024", "name": "dog.jpg", "analyzed_name": "2024/dog.jpg",
                "type": "object", "object": "2024/dog.jpg", "content_type": "image/jpeg",
                "meta": {}
            } }
        ]
    }
}"#;

fn backend(url: String) -> ElasticBackend {
    ElasticBackend::new(&IndexConfig {
        elastic_hosts: vec![url],
        ..IndexConfig::default()
    })
    .expect("backend")
}

#[tokio::test]
async fn test_search_request_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let engine = server
        .mock("POST", "/os_default/_search")
        .match_body(Matcher::PartialJson(json!({
            "query": { "bool": { "filter": [
                { "term": { "account": "AUTH_a" } },
                { "term": { "type": "object" } },
                { "term": { "dir": "photos/2024" } }
            ] } },
            "from": 5,
            "size": 2
        })))
        .with_status(200)
        .with_body(HITS)
        .create_async()
        .await;

    let (account, path) = split_search_path("/v1/AUTH_a/photos/2024/", "v1").expect("path");
    let request = SearchRequest::from_query_pairs(
        account,
        path,
        [
            ("q", "*cat*"),
            ("type", "object"),
            ("recursive", "false"),
            ("limit", "2"),
            ("offset", "5"),
        ],
    )
    .expect("request");

    let results = search(&backend(server.url()), "os_default", request)
        .await
        .expect("search");
    engine.assert_async().await;

    assert_eq!(results.count, 2);
    assert_eq!(results.total, 7);
    assert_eq!(results.offset, 5);
    assert!(!results.has_more(), "offset 5 + 2 rows reaches the total of 7");
    assert_eq!(results.next_offset(), None);

    let first = &results.results[0];
    assert_eq!(first["name"], "2024/cat.jpg");
    assert_eq!(first["meta_color"], "grey");
    assert!(first.get("hash").is_none());
    assert!(first.get("account").is_none());
    assert!(first.get("meta").is_none());

    let rendered = render(&results, ResponseFormat::negotiate(None, Some("text/xml")))
        .expect("render");
    assert!(rendered.body.contains("<name>2024/cat.jpg</name>"));
    assert!(
        rendered
            .headers
            .contains(&("X-Search-Items-Total".to_string(), "7".to_string()))
    );
}

#[tokio::test]
async fn test_engine_outage_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _down = server
        .mock("POST", "/os_default/_search")
        .with_status(503)
        .create_async()
        .await;

    let backend = backend(server.url()).with_retry(search_river::search::RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        max_delay: Duration::from_millis(1),
    });
    let request = SearchRequest::new("AUTH_a");
    let err = search(&backend, "os_default", request).await.unwrap_err();
    assert!(matches!(err, SearchError::Unavailable(_)));
}

#[test]
fn test_invalid_type_is_rejected_before_searching() {
    let err = SearchRequest::from_query_pairs("AUTH_a", None, [("type", "account")]).unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
}
