//! Integration tests for the operation pipeline over a live HTTP server.
//!
//! These tests run real requests through the reqwest-backed transport
//! against a wiremock server, verifying decode behavior, outcome flags,
//! the connection-error rescue policy, and cache invalidation.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rest_record::transport::HttpTransport;
use rest_record::{Resource, ResourceAdapter, ResourceCache, RestConfig};

fn transport() -> HttpTransport {
    HttpTransport::new().unwrap()
}

// ============================================================================
// Decode and Outcome Flag Tests
// ============================================================================

#[tokio::test]
async fn test_get_decodes_json_body_with_completed_flags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/segments/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"segment":{"id":1,"name":"John Doe"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let resource = Resource::new(&format!("{}/segments/1", server.uri()))
        .unwrap()
        .get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &RestConfig::default(), &http, &cache);

    let result = adapter.call(None).await.unwrap();
    assert!(result.transmitted());
    assert!(result.completed());
    assert!(!result.aborted());
    assert_eq!(
        result.payload,
        Some(json!({"segment": {"id": 1, "name": "John Doe"}}))
    );
}

#[tokio::test]
async fn test_404_raises_request_failed_with_aborted_flags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resource = Resource::new(&format!("{}/missing", server.uri()))
        .unwrap()
        .get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &RestConfig::default(), &http, &cache);

    let error = adapter.call(None).await.unwrap_err();
    assert_eq!(error.status(), Some(404));

    let result = adapter.last_result().unwrap();
    assert!(result.transmitted());
    assert!(result.aborted());
    assert!(!result.completed());
}

#[tokio::test]
async fn test_unwrap_client_exceptions_keeps_the_raw_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_raw(r#"{"errors":["gone"]}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let config = RestConfig {
        unwrap_client_exceptions: true,
        ..RestConfig::default()
    };
    let resource = Resource::new(&format!("{}/missing", server.uri()))
        .unwrap()
        .get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &config, &http, &cache);

    let result = adapter.call(None).await.unwrap();
    assert!(result.transmitted());
    assert!(result.completed());
    assert!(result.was_substituted());
    assert_eq!(result.response.as_ref().unwrap().status, 404);
    // A substituted result is never decoded.
    assert!(result.payload.is_none());
}

// ============================================================================
// Connection-Error Rescue Tests
// ============================================================================

// Port 9 (discard) on localhost is not listening, so connects are refused.
const UNREACHABLE: &str = "http://127.0.0.1:9/widgets";

#[tokio::test]
async fn test_connection_refusal_substitutes_a_mock_503() {
    let resource = Resource::new(UNREACHABLE).unwrap().get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &RestConfig::default(), &http, &cache);

    let result = adapter.call(None).await.unwrap();
    assert!(!result.transmitted());
    assert!(result.completed());
    assert!(!result.aborted());
    assert_eq!(result.response.as_ref().unwrap().status, 503);
}

#[tokio::test]
async fn test_connection_refusal_propagates_when_mocking_disabled() {
    let config = RestConfig {
        mock_response_on_connection_error: false,
        ..RestConfig::default()
    };
    let resource = Resource::new(UNREACHABLE).unwrap().get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &config, &http, &cache);

    let error = adapter.call(None).await.unwrap_err();
    assert!(error.is_connection_error());

    let result = adapter.last_result().unwrap();
    assert!(!result.transmitted());
    assert!(result.aborted());
    assert!(!result.completed());
}

// ============================================================================
// Resource Cache Tests
// ============================================================================

#[tokio::test]
async fn test_repeat_gets_invoke_transport_once_while_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"widgets":[]}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::new(&format!("{}/widgets", server.uri()))
        .unwrap()
        .get();
    let cache = ResourceCache::new();
    cache.enable();
    let http = transport();
    let config = RestConfig::default();

    let first = ResourceAdapter::new(resource.clone(), &config, &http, &cache)
        .call(None)
        .await
        .unwrap();
    let second = ResourceAdapter::new(resource, &config, &http, &cache)
        .call(None)
        .await
        .unwrap();
    assert_eq!(first.payload, second.payload);

    server.verify().await;
}

#[tokio::test]
async fn test_unsafe_verb_clears_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"widgets":[]}"#, "application/json"),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/widgets"))
        .respond_with(ResponseTemplate::new(201).set_body_raw("{}", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let listing = Resource::new(&format!("{}/widgets", server.uri()))
        .unwrap()
        .get();
    let cache = ResourceCache::new();
    cache.enable();
    let http = transport();
    let config = RestConfig::default();

    ResourceAdapter::new(listing.clone(), &config, &http, &cache)
        .call(None)
        .await
        .unwrap();
    ResourceAdapter::new(listing.post(), &config, &http, &cache)
        .call(Some(json!({})))
        .await
        .unwrap();
    // The POST invalidated the memo, so this GET goes to the server again.
    ResourceAdapter::new(listing, &config, &http, &cache)
        .call(None)
        .await
        .unwrap();

    server.verify().await;
}

// ============================================================================
// Builder and Query Assembly Tests
// ============================================================================

#[tokio::test]
async fn test_query_fragments_merge_key_wise_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .and(query_param("q", "2"))
        .and(query_param("r", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::new(&format!("{}/widgets", server.uri()))
        .unwrap()
        .query("q=1&q=2")
        .query("r=1")
        .get();
    let cache = ResourceCache::new();
    let http = transport();
    let mut adapter = ResourceAdapter::new(resource, &RestConfig::default(), &http, &cache);

    adapter.call(None).await.unwrap();
    server.verify().await;
}

#[test]
fn test_builders_never_mutate_their_receiver() {
    let base = Resource::new("http://example.test/api/").unwrap();
    let extended = base.path("widgets");

    assert_eq!(base.to_url().unwrap(), "http://example.test/api/");
    assert_eq!(extended.to_url().unwrap(), "http://example.test/api/widgets");
}
