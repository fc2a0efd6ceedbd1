//! Full push/delete paths of the REST adapters (Amazon, eBay, Magento, WooCommerce)

use serde_json::json;
use wiremock::matchers::{basic_auth, bearer_token, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use salesync_core::domain::{ChannelError, ChannelType};

use crate::common::{linked_record, new_record, product, setup_adapter, setup_adapter_with, ACCESS_TOKEN};

#[tokio::test]
async fn test_amazon_create_puts_listing_for_marketplace() {
    let (server, adapter) = setup_adapter(ChannelType::Amazon).await;

    Mock::given(method("PUT"))
        .and(path("/listings/2021-08-01/items/SELLER-1/CHAIR-01"))
        .and(query_param("marketplaceIds", "ATVPDKIKX0DER"))
        .and(header("x-amz-access-token", ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sku": "CHAIR-01",
            "status": "ACCEPTED",
            "submissionId": "f1dc2914-75dd-11ea-bc55-0242ac130003",
            "issues": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(outcome.succeeded);
    assert_eq!(outcome.remote_id.unwrap().as_str(), "CHAIR-01");
}

#[tokio::test]
async fn test_amazon_invalid_submission_is_a_failed_outcome() {
    let (server, adapter) = setup_adapter(ChannelType::Amazon).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sku": "CHAIR-01",
            "status": "INVALID",
            "issues": [{"code": "90220", "message": "'price' is required but not supplied.", "severity": "ERROR"}]
        })))
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(!outcome.succeeded);
    assert!(outcome.error_detail.unwrap().contains("90220"));
}

#[tokio::test]
async fn test_woocommerce_create_returns_numeric_id() {
    let (server, adapter) = setup_adapter(ChannelType::WooCommerce).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wc/v3/products"))
        .and(basic_auth("ck_test", "cs_test"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 794,
            "sku": "CHAIR-01",
            "status": "publish"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(outcome.succeeded);
    assert_eq!(outcome.remote_id.unwrap().as_str(), "794");
}

#[tokio::test]
async fn test_woocommerce_update_targets_remote_id() {
    let (server, adapter) = setup_adapter(ChannelType::WooCommerce).await;

    Mock::given(method("PUT"))
        .and(path("/wp-json/wc/v3/products/794"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 794})))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter
        .build_payload(&product(), &linked_record("794"))
        .unwrap();
    assert!(!payload.is_create());
    let response = adapter.push(&payload).await.unwrap();
    assert!(adapter.parse_response(&response).succeeded);
}

#[tokio::test]
async fn test_woocommerce_validation_error_is_rejected() {
    let (server, adapter) = setup_adapter(ChannelType::WooCommerce).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wc/v3/products"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "woocommerce_rest_product_invalid_sku",
            "message": "Invalid or duplicated SKU.",
            "data": {"status": 400}
        })))
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let err = adapter.push(&payload).await.unwrap_err();
    assert_eq!(
        err,
        ChannelError::RemoteRejected("HTTP 400: Invalid or duplicated SKU.".to_string())
    );
}

#[tokio::test]
async fn test_ebay_delete_treats_missing_item_as_done() {
    let (server, adapter) = setup_adapter(ChannelType::Ebay).await;

    Mock::given(method("DELETE"))
        .and(path("/sell/inventory/v1/inventory_item/CHAIR-01"))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"errorId": 25702, "message": "SKU could not be found"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter.delete(&linked_record("CHAIR-01")).await.unwrap();
}

#[tokio::test]
async fn test_ebay_delete_without_remote_id_makes_no_call() {
    let (server, adapter) = setup_adapter(ChannelType::Ebay).await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    adapter.delete(&new_record()).await.unwrap();
}

#[tokio::test]
async fn test_magento_create_posts_to_all_stores() {
    let (server, adapter) = setup_adapter_with(ChannelType::Magento, |config| {
        config.default_view = None;
    })
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/all/V1/products"))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2048,
            "sku": "CHAIR-01",
            "attribute_set_id": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = adapter.build_payload(&product(), &new_record()).unwrap();
    let response = adapter.push(&payload).await.unwrap();
    let outcome = adapter.parse_response(&response);

    assert!(outcome.succeeded);
    assert_eq!(outcome.remote_id.unwrap().as_str(), "CHAIR-01");
}

#[tokio::test]
async fn test_magento_server_error_is_transient() {
    let (server, adapter) = setup_adapter(ChannelType::Magento).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let payload = adapter
        .build_payload(&product(), &linked_record("CHAIR-01"))
        .unwrap();
    let err = adapter.push(&payload).await.unwrap_err();
    assert!(err.is_transient());
}
