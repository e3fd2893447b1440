use assert_matches::assert_matches;
use chrono::Duration as ChronoDuration;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::clients::shipping::ShippingClient;
use storefront_api::config::ShippingConfig;
use storefront_api::errors::ServiceError;

fn config_for(server: &MockServer) -> ShippingConfig {
    ShippingConfig {
        email: Some("ship@example.com".into()),
        password: Some("pw".into()),
        base_url: server.uri(),
        pickup_location: "Primary".into(),
        track_timeout_secs: 2,
    }
}

async fn mount_login(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/external/auth/login"))
        .and(body_partial_json(json!({
            "email": "ship@example.com",
            "password": "pw"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn token_is_cached_within_its_validity_window() {
    let server = MockServer::start().await;
    mount_login(&server, "tok_1", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/external/courier/serviceability/"))
        .and(header("Authorization", "Bearer tok_1"))
        .and(query_param("pickup_postcode", "560001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "available_courier_companies": [
                    { "courier_company_id": 1, "courier_name": "BlueDart", "rate": 80.0, "etd": "2 days" }
                ]
            }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = ShippingClient::from_config(&config_for(&server));

    // Two calls, one login.
    for _ in 0..2 {
        let couriers = client
            .check_serviceability("560001", "110001", 0.5, false)
            .await
            .unwrap();
        assert_eq!(couriers.len(), 1);
        assert_eq!(couriers[0].courier_name, "BlueDart");
    }
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_relogin() {
    let server = MockServer::start().await;
    mount_login(&server, "tok_fresh", 2).await;

    Mock::given(method("GET"))
        .and(path("/v1/external/channels"))
        .and(header("Authorization", "Bearer tok_fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let client =
        ShippingClient::from_config(&config_for(&server)).with_token_ttl(ChronoDuration::zero());

    client.channels().await.unwrap();
    client.channels().await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/external/auth/login"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Wrong email or password"
        })))
        .mount(&server)
        .await;

    let client = ShippingClient::from_config(&config_for(&server));
    let err = client.channels().await.unwrap_err();
    assert_matches!(err, ServiceError::AuthError(_));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.email = None;

    let client = ShippingClient::from_config(&config);
    let err = client.channels().await.unwrap_err();
    assert_matches!(err, ServiceError::ConfigurationError(_));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn awb_assignment_unwraps_provider_envelope() {
    let server = MockServer::start().await;
    mount_login(&server, "tok_awb", 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/external/courier/assign/awb"))
        .and(body_partial_json(json!({ "shipment_id": 4242 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "data": {
                    "awb_code": "AWB0001",
                    "courier_company_id": 7,
                    "courier_name": "Delhivery"
                }
            }
        })))
        .mount(&server)
        .await;

    let client = ShippingClient::from_config(&config_for(&server));
    let awb = client.assign_awb(4242, None).await.unwrap();

    assert_eq!(awb.awb_code, "AWB0001");
    assert_eq!(awb.courier_name.as_deref(), Some("Delhivery"));
}

#[tokio::test]
async fn account_queries_share_one_token() {
    let server = MockServer::start().await;
    mount_login(&server, "tok_acct", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/external/orders"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "10"))
        .and(header("Authorization", "Bearer tok_acct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/external/orders/show/4242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": 4242 } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/external/account/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "company_id": 99 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/external/orders/rto/cancel"))
        .and(body_partial_json(json!({ "ids": [4242] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ShippingClient::from_config(&config_for(&server));
    client.list_orders(2, 10).await.unwrap();
    let details = client.order_details(4242).await.unwrap();
    assert_eq!(details["data"]["id"], 4242);
    let account = client.account_details().await.unwrap();
    assert_eq!(account["company_id"], 99);
    client.cancel_rto(&[4242]).await.unwrap();
}

#[tokio::test]
async fn provider_failures_carry_http_status() {
    let server = MockServer::start().await;
    mount_login(&server, "tok_err", 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/external/orders/create/adhoc"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "billing_pincode is invalid"
        })))
        .mount(&server)
        .await;

    let client = ShippingClient::from_config(&config_for(&server));
    let request = storefront_api::clients::shipping::ShipmentRequest {
        order_id: "ord".into(),
        order_date: "01/01/2025".into(),
        pickup_location: "Primary".into(),
        billing_customer_name: "Asha".into(),
        billing_last_name: String::new(),
        billing_address: "221B Residency Road".into(),
        billing_city: "Bengaluru".into(),
        billing_pincode: "bad".into(),
        billing_state: "Karnataka".into(),
        billing_country: "India".into(),
        billing_email: "asha@example.com".into(),
        billing_phone: "+911234567890".into(),
        shipping_is_billing: true,
        order_items: vec![],
        payment_method: "Prepaid".into(),
        sub_total: 1499.0,
        length: 10.0,
        breadth: 10.0,
        height: 10.0,
        weight: 0.5,
    };
    let err = client.create_shipment(&request).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::ProviderError { status: Some(422), message }
            if message == "billing_pincode is invalid"
    );
}
