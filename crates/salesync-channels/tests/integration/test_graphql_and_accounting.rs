//! Shopify (GraphQL), QuickBooks (SyncToken) and SHEIN flows

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use salesync_core::domain::{ChannelError, ChannelType};

use crate::common::{linked_record, new_record, product, setup_adapter, ACCESS_TOKEN};

const SHOPIFY_GRAPHQL: &str = "/admin/api/2024-01/graphql.json";

#[tokio::test]
async fn test_shopify_create_returns_gid() {
    let (server, adapter) = setup_adapter(ChannelType::Shopify).await;

    Mock::given(method("POST"))
        .and(path(SHOPIFY_GRAPHQL))
        .and(header("X-Shopify-Access-Token", ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productCreate": {
                "product": {"id": "gid://shopify/Product/1072481062"},
                "userErrors": []
            }}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(outcome.succeeded);
    assert_eq!(
        outcome.remote_id.unwrap().as_str(),
        "gid://shopify/Product/1072481062"
    );
}

#[tokio::test]
async fn test_shopify_user_errors_fail_the_push() {
    let (server, adapter) = setup_adapter(ChannelType::Shopify).await;

    Mock::given(method("POST"))
        .and(path(SHOPIFY_GRAPHQL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productUpdate": {
                "product": null,
                "userErrors": [{"field": ["input", "variants"], "message": "Price must be positive"}]
            }}
        })))
        .mount(&server)
        .await;

    let payload = adapter
        .build_payload(&product(), &linked_record("gid://shopify/Product/1"))
        .unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(!outcome.succeeded);
    assert!(outcome
        .error_detail
        .unwrap()
        .contains("Price must be positive"));
}

#[tokio::test]
async fn test_shopify_throttled_body_is_transient() {
    let (server, adapter) = setup_adapter(ChannelType::Shopify).await;

    Mock::given(method("POST"))
        .and(path(SHOPIFY_GRAPHQL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]
        })))
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let err = adapter.push(&payload).await.unwrap_err();
    assert!(matches!(err, ChannelError::RemoteTransient(_)));
}

#[tokio::test]
async fn test_quickbooks_update_reads_sync_token_first() {
    let (server, adapter) = setup_adapter(ChannelType::QuickBooks).await;

    Mock::given(method("GET"))
        .and(path("/v3/company/SELLER-1/item/19"))
        .and(query_param("minorversion", "65"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Item": {"Id": "19", "SyncToken": "3", "Name": "Oak chair"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v3/company/SELLER-1/item"))
        .and(body_partial_json(json!({"Id": "19", "SyncToken": "3", "sparse": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Item": {"Id": "19", "SyncToken": "4"},
            "time": "2026-10-19T10:00:00.000-07:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter
        .build_payload(&product(), &linked_record("19"))
        .unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(outcome.succeeded);
    assert_eq!(outcome.remote_id.unwrap().as_str(), "19");
}

#[tokio::test]
async fn test_quickbooks_update_of_vanished_item_is_rejected() {
    let (server, adapter) = setup_adapter(ChannelType::QuickBooks).await;

    Mock::given(method("GET"))
        .and(path("/v3/company/SELLER-1/item/19"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let payload = adapter
        .build_payload(&product(), &linked_record("19"))
        .unwrap();
    let err = adapter.push(&payload).await.unwrap_err();
    assert!(matches!(err, ChannelError::RemoteRejected(_)));
}

#[tokio::test]
async fn test_quickbooks_delete_deactivates_item() {
    let (server, adapter) = setup_adapter(ChannelType::QuickBooks).await;

    Mock::given(method("GET"))
        .and(path("/v3/company/SELLER-1/item/19"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Item": {"Id": "19", "SyncToken": "7"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v3/company/SELLER-1/item"))
        .and(body_partial_json(json!({"Id": "19", "SyncToken": "7", "Active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Item": {"Id": "19", "SyncToken": "8", "Active": false}
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter.delete(&linked_record("19")).await.unwrap();
}

#[tokio::test]
async fn test_shein_delete_makes_no_call() {
    let (server, adapter) = setup_adapter(ChannelType::Shein).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    adapter.delete(&linked_record("p2309251234")).await.unwrap();
}

#[tokio::test]
async fn test_shein_business_error_in_ok_body() {
    let (server, adapter) = setup_adapter(ChannelType::Shein).await;

    Mock::given(method("POST"))
        .and(path("/open-api/goods/product/publishOrEdit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "20001",
            "msg": "category not found",
            "info": null
        })))
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);
    assert!(!outcome.succeeded);
    assert_eq!(outcome.error_detail.as_deref(), Some("20001: category not found"));
}
