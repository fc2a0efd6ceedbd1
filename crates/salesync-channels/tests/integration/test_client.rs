//! ChannelClient against a mock server: classification, auth and throttling

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use salesync_channels::{AdaptiveRateLimiter, ChannelAuth, ChannelClient};
use salesync_core::domain::{ChannelError, ChannelId, ChannelType};
use salesync_core::ports::{HttpMethod, Payload, PayloadOperation};

use crate::common::{http_config, ACCESS_TOKEN};

fn channel() -> ChannelId {
    ChannelId::new(1).unwrap()
}

async fn setup_client() -> (MockServer, ChannelClient) {
    let server = MockServer::start().await;
    let client = ChannelClient::new(channel(), server.uri(), &http_config())
        .unwrap()
        .with_auth(ChannelAuth::Bearer(ACCESS_TOKEN.to_string()));
    (server, client)
}

#[tokio::test]
async fn test_send_echoes_remote_key_and_applies_auth() {
    let (server, client) = setup_client().await;

    Mock::given(method("PUT"))
        .and(path("/items/CHAIR-01"))
        .and(query_param("marketplaceIds", "A1PA6795UKMFR9"))
        .and(bearer_token(ACCESS_TOKEN))
        .and(body_json(json!({"price": 12.5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ACCEPTED"})))
        .expect(1)
        .mount(&server)
        .await;

    let payload = Payload::new(
        ChannelType::Amazon,
        PayloadOperation::Update,
        HttpMethod::Put,
        "/items/CHAIR-01",
    )
    .with_query("marketplaceIds", "A1PA6795UKMFR9")
    .with_body(json!({"price": 12.5}))
    .with_remote_key("CHAIR-01");

    let response = client.send(&payload).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body["status"], "ACCEPTED");
    assert_eq!(response.remote_key.as_deref(), Some("CHAIR-01"));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup_client().await;

    Mock::given(method("POST"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client
        .execute(HttpMethod::Post, "/products", &[], Some(&json!({})))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.detail(), "HTTP 503: upstream unavailable");
}

#[tokio::test]
async fn test_validation_error_is_rejected_with_detail() {
    let (server, client) = setup_client().await;

    Mock::given(method("POST"))
        .and(path("/products"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "invalid price"})),
        )
        .mount(&server)
        .await;

    let err = client
        .execute(HttpMethod::Post, "/products", &[], Some(&json!({"price": -1})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChannelError::RemoteRejected("HTTP 400: invalid price".to_string())
    );
}

#[tokio::test]
async fn test_rate_limit_response_throttles_channel() {
    let (server, client) = setup_client().await;
    let limiter = Arc::new(AdaptiveRateLimiter::new());
    limiter.register(channel(), 120);
    let client = client.with_rate_limiter(Arc::clone(&limiter));

    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client
        .execute(HttpMethod::Get, "/items/1", &[], None)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.detail(), "HTTP 429 rate limited, retry after 7s");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(limiter.effective_capacity(channel()), Some(60));
}

#[tokio::test]
async fn test_exhausted_rate_limit_defers_without_calling() {
    let (server, client) = setup_client().await;
    let limiter = Arc::new(AdaptiveRateLimiter::new());
    limiter.register(channel(), 1);
    let client = client
        .with_rate_limiter(Arc::clone(&limiter))
        .with_rate_limit_wait(Duration::from_millis(50));

    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    client
        .execute(HttpMethod::Get, "/items/1", &[], None)
        .await
        .unwrap();
    let err = client
        .execute(HttpMethod::Get, "/items/1", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::RemoteTransient(_)), "got {err:?}");
    assert!(err.detail().contains("rate limit"));
}

#[tokio::test]
async fn test_missing_resource_allowed_for_removals() {
    let (server, client) = setup_client().await;

    Mock::given(method("DELETE"))
        .and(path("/items/GONE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
        .mount(&server)
        .await;

    let response = client
        .execute_allow_missing(HttpMethod::Delete, "/items/GONE", &[], None)
        .await
        .unwrap();
    assert_eq!(response.status, 404);

    let err = client
        .execute(HttpMethod::Delete, "/items/GONE", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::RemoteRejected(_)));
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let (server, client) = setup_client().await;

    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let response = client
        .execute(HttpMethod::Delete, "/items/1", &[], None)
        .await
        .unwrap();
    assert_eq!(response.status, 204);
    assert!(response.body.is_null());
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let (server, client) = setup_client().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = client
        .execute(HttpMethod::Get, "/slow", &[], None)
        .await
        .unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_host_is_transient() {
    let client = ChannelClient::new(channel(), "http://127.0.0.1:1", &http_config()).unwrap();
    let err = client
        .execute(HttpMethod::Get, "/items", &[], None)
        .await
        .unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
