use std::collections::HashMap;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::clients::payment_gateway::{PaymentGatewayClient, RECEIPT_MAX_LEN};
use storefront_api::config::PaymentConfig;
use storefront_api::errors::ServiceError;

fn client_for(server: &MockServer) -> PaymentGatewayClient {
    let config = PaymentConfig {
        key_id: Some("rzp_test_key".into()),
        key_secret: Some("test_secret".into()),
        base_url: server.uri(),
        order_timeout_secs: 2,
        fetch_timeout_secs: 1,
    };
    PaymentGatewayClient::from_config(&config)
        .expect("client config is complete")
        .with_fetch_retry_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn create_order_sends_basic_auth_and_capture_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(basic_auth("rzp_test_key", "test_secret"))
        .and(body_partial_json(json!({
            "amount": 149900,
            "currency": "INR",
            "payment_capture": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_abc123",
            "amount": 149900,
            "currency": "INR",
            "receipt": "SP_1_aaaaaa",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let order = client
        .create_order(149900, "INR", "SP_1_aaaaaa", HashMap::new())
        .await
        .unwrap();

    assert_eq!(order.id, "order_abc123");
    assert_eq!(order.amount, 149900);
    assert_eq!(order.status, "created");
}

#[tokio::test]
async fn create_order_surfaces_provider_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "BAD_REQUEST_ERROR",
                "description": "amount exceeds maximum amount allowed"
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .create_order(1, "INR", "r1", HashMap::new())
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::ProviderError { status: Some(400), message }
            if message == "amount exceeds maximum amount allowed"
    );
}

#[tokio::test]
async fn create_order_rejects_bad_input_without_calling_provider() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would 404 and the asserts below would
    // see a ProviderError instead of a ValidationError.
    let client = client_for(&server);

    let err = client
        .create_order(-5, "INR", "r1", HashMap::new())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let long_receipt = "x".repeat(RECEIPT_MAX_LEN + 1);
    let err = client
        .create_order(100, "INR", &long_receipt, HashMap::new())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_payment_retries_transient_failures() {
    let server = MockServer::start().await;

    // Two slow responses exhaust the 1 s timeout, then a fast success.
    Mock::given(method("GET"))
        .and(path("/payments/pay_retry"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/pay_retry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pay_retry",
            "order_id": "order_abc",
            "amount": 149900,
            "currency": "INR",
            "status": "captured",
            "method": "upi",
            "email": "asha@example.com",
            "contact": "+911234567890"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let payment = client.fetch_payment("pay_retry", 3).await.unwrap();

    assert_eq!(payment.id, "pay_retry");
    assert_eq!(payment.method.as_deref(), Some("upi"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn fetch_payment_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/pay_down"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_payment("pay_down", 3).await.unwrap_err();
    assert_matches!(err, ServiceError::TimeoutError(_));
}

#[tokio::test]
async fn fetch_payment_does_not_retry_provider_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/pay_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "description": "payment not found" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_payment("pay_missing", 3).await.unwrap_err();
    assert_matches!(err, ServiceError::ProviderError { status: Some(404), .. });
}

#[test]
fn missing_credentials_fail_construction() {
    let config = PaymentConfig {
        key_id: None,
        key_secret: Some("secret".into()),
        base_url: "https://api.example".into(),
        order_timeout_secs: 30,
        fetch_timeout_secs: 15,
    };
    let err = PaymentGatewayClient::from_config(&config).unwrap_err();
    assert_matches!(err, ServiceError::ConfigurationError(_));
}
