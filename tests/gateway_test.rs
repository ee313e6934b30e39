use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticketshop::config::GatewayConfig;
use ticketshop::errors::ServiceError;
use ticketshop::services::payments::PaymentGateway;
use ticketshop::services::PayPalGateway;

fn gateway_for(server: &MockServer) -> PayPalGateway {
    PayPalGateway::new(&GatewayConfig {
        client_id: "cid".into(),
        secret: "sec".into(),
        mode: "sandbox".into(),
        base_url: Some(server.uri()),
        brand_name: "TestShop".into(),
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        // base64("cid:sec")
        .and(header("Authorization", "Basic Y2lkOnNlYw=="))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_order_sends_capture_intent_and_returns_the_approve_link() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_string_contains("\"intent\":\"CAPTURE\""))
        .and(body_string_contains("\"value\":\"15.00\""))
        .and(body_string_contains("\"reference_id\":\"ts_t-1_u-1_abc\""))
        .and(body_string_contains("\"brand_name\":\"TestShop\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PP-1",
            "status": "CREATED",
            "links": [
                {"rel": "self", "href": "https://example/self", "method": "GET"},
                {"rel": "approve", "href": "https://example/approve", "method": "GET"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway_for(&server)
        .create_order(
            dec!(15.00),
            "PLN".into(),
            "Crate Key x3 for Player1".into(),
            "ts_t-1_u-1_abc".into(),
        )
        .await
        .unwrap();

    assert_eq!(created.order_id, "PP-1");
    assert_eq!(created.approval_link.as_deref(), Some("https://example/approve"));
}

#[tokio::test]
async fn create_order_without_approve_link_still_succeeds() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PP-2",
            "status": "CREATED"
        })))
        .mount(&server)
        .await;

    let created = gateway_for(&server)
        .create_order(dec!(5.00), "PLN".into(), "d".into(), "r".into())
        .await
        .unwrap();
    assert!(created.approval_link.is_none());
}

#[tokio::test]
async fn get_order_reports_the_processor_status() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/PP-1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PP-1",
            "status": "APPROVED"
        })))
        .mount(&server)
        .await;

    let order = gateway_for(&server).get_order("PP-1".into()).await.unwrap();
    assert!(order.is_approved());
    assert!(!order.is_completed());
}

#[tokio::test]
async fn capture_order_posts_to_the_capture_endpoint() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PP-1/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PP-1",
            "status": "COMPLETED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = gateway_for(&server)
        .capture_order("PP-1".into())
        .await
        .unwrap();
    assert!(order.is_completed());
}

#[tokio::test]
async fn processor_errors_become_gateway_errors() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/PP-1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string("{\"name\":\"INTERNAL_ERROR\"}"),
        )
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .get_order("PP-1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError(msg) if msg.contains("500")));
}

#[tokio::test]
async fn rejected_credentials_fail_before_the_order_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            "{\"error\":\"invalid_client\"}",
        ))
        .mount(&server)
        .await;
    // No /v2/checkout mocks: reaching them would 404 and still fail, but
    // the error must come from the token exchange.

    let err = gateway_for(&server)
        .create_order(dec!(5.00), "PLN".into(), "d".into(), "r".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError(msg) if msg.contains("token")));
}

#[tokio::test]
async fn malformed_response_is_a_gateway_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/PP-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .get_order("PP-1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayError(msg) if msg.contains("malformed")));
}
