use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Database, Schema};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::clients::payment_gateway::PaymentGatewayClient;
use storefront_api::config::{AdminNotifyConfig, EmailConfig, PaymentConfig};
use storefront_api::entities::{order, order_item};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::services::admin_notify::AdminNotifier;
use storefront_api::services::checkout::{
    BeginCheckoutRequest, CheckoutService, VerifyPaymentRequest,
};
use storefront_api::services::email::EmailService;
use storefront_api::services::orders::{NewOrderItem, OrderService};

struct Harness {
    checkout: CheckoutService,
    orders: Arc<OrderService>,
    payments: Arc<PaymentGatewayClient>,
}

/// Wires the checkout service against an in-memory database, a wiremock
/// payment provider, a wiremock admin webhook, and an unconfigured email
/// service (which reports failure without sending).
async fn setup(payment_server: &MockServer, admin_server: &MockServer) -> Harness {
    let db = Database::connect("sqlite::memory:").await.expect("sqlite");
    let schema = Schema::new(db.get_database_backend());
    for stmt in [
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
    ] {
        db.execute(db.get_database_backend().build(&stmt))
            .await
            .expect("create table");
    }

    let (tx, _rx) = mpsc::channel(64);
    let orders = Arc::new(OrderService::new(db, EventSender::new(tx)));

    let payments = Arc::new(
        PaymentGatewayClient::from_config(&PaymentConfig {
            key_id: Some("rzp_test_key".into()),
            key_secret: Some("test_secret".into()),
            base_url: payment_server.uri(),
            order_timeout_secs: 2,
            fetch_timeout_secs: 1,
        })
        .expect("payment config is complete")
        .with_fetch_retry_delay(Duration::from_millis(10)),
    );

    let email = Arc::new(EmailService::from_config(
        &EmailConfig {
            user: None,
            pass: None,
            smtp_host: "smtp.gmail.com".into(),
            sender_name: "Storefront".into(),
            base_delay_ms: 1,
            max_attempts: 3,
        },
        false,
    ));

    let admin = Arc::new(AdminNotifier::from_config(&AdminNotifyConfig {
        endpoint_url: Some(admin_server.uri()),
    }));

    let checkout = CheckoutService::new(
        orders.clone(),
        payments.clone(),
        email,
        admin,
        "INR".into(),
        "https://shop.example".into(),
    );

    Harness {
        checkout,
        orders,
        payments,
    }
}

fn begin_request() -> BeginCheckoutRequest {
    BeginCheckoutRequest {
        user_id: "user_1".into(),
        customer_name: "Asha Rao".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: "+911234567890".into(),
        shipping_address: "221B Residency Road, Bengaluru".into(),
        items: vec![NewOrderItem {
            product_id: "prod_kurta".into(),
            product_name: "Cotton Kurta".into(),
            product_price: dec!(1499),
            quantity: 1,
        }],
        receipt: None,
    }
}

async fn mount_provider_order(server: &MockServer, provider_order_id: &str) {
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_partial_json(json!({
            "amount": 149900,
            "currency": "INR",
            "payment_capture": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": provider_order_id,
            "amount": 149900,
            "currency": "INR",
            "receipt": "SP_1_aaaaaa",
            "status": "created"
        })))
        .mount(server)
        .await;
}

async fn mount_payment_fetch(server: &MockServer, payment_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/payments/{}", payment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": payment_id,
            "order_id": "order_prov_1",
            "amount": 149900,
            "currency": "INR",
            "status": "captured",
            "method": "upi",
            "email": "asha@example.com",
            "contact": "+911234567890"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn invalid_input_never_reaches_the_provider() {
    let payment_server = MockServer::start().await;
    let admin_server = MockServer::start().await;
    mount_provider_order(&payment_server, "order_prov_1").await;
    let h = setup(&payment_server, &admin_server).await;

    let mut request = begin_request();
    request.shipping_address = String::new();

    let err = h.checkout.begin(request).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // The guard runs before the provider call, so no order is orphaned
    // upstream.
    assert!(payment_server.received_requests().await.unwrap().is_empty());

    let mut request = begin_request();
    request.items[0].product_price = dec!(-1);
    let err = h.checkout.begin(request).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert!(payment_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn begin_creates_provider_and_pending_order() {
    let payment_server = MockServer::start().await;
    let admin_server = MockServer::start().await;
    mount_provider_order(&payment_server, "order_prov_1").await;
    let h = setup(&payment_server, &admin_server).await;

    let response = h.checkout.begin(begin_request()).await.unwrap();
    assert_eq!(response.provider_order_id, "order_prov_1");
    assert_eq!(response.amount_minor, 149900);
    assert_eq!(response.currency, "INR");

    let order = h.orders.find_by_provider_order("order_prov_1").await.unwrap();
    assert_eq!(order.id, response.order_id);
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "pending");
    assert_eq!(order.total_amount, dec!(1499));
}

#[tokio::test]
async fn verified_payment_completes_despite_notification_failures() {
    let payment_server = MockServer::start().await;
    let admin_server = MockServer::start().await;
    mount_provider_order(&payment_server, "order_prov_1").await;
    mount_payment_fetch(&payment_server, "pay_1").await;
    // Admin webhook is down; email is unconfigured.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&admin_server)
        .await;
    let h = setup(&payment_server, &admin_server).await;

    h.checkout.begin(begin_request()).await.unwrap();
    let signature = h.payments.sign("order_prov_1", "pay_1");

    let response = h
        .checkout
        .verify_and_complete(VerifyPaymentRequest {
            provider_order_id: "order_prov_1".into(),
            provider_payment_id: "pay_1".into(),
            provider_signature: signature,
        })
        .await
        .unwrap();

    // Both side effects failed, the verified outcome stands.
    assert_eq!(response.status, "confirmed");
    assert_eq!(response.payment_status, "completed");
    assert!(!response.already_completed);
    assert!(!response.email.as_ref().unwrap().delivered);
    assert!(!response.admin_notification.as_ref().unwrap().delivered);

    let order = h.orders.find_by_provider_order("order_prov_1").await.unwrap();
    assert_eq!(order.payment_status, "completed");
    assert_eq!(order.payment_method.as_deref(), Some("upi"));
}

#[tokio::test]
async fn replayed_verification_runs_no_side_effects() {
    let payment_server = MockServer::start().await;
    let admin_server = MockServer::start().await;
    mount_provider_order(&payment_server, "order_prov_1").await;
    mount_payment_fetch(&payment_server, "pay_1").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&admin_server)
        .await;
    let h = setup(&payment_server, &admin_server).await;

    h.checkout.begin(begin_request()).await.unwrap();
    let request = || VerifyPaymentRequest {
        provider_order_id: "order_prov_1".into(),
        provider_payment_id: "pay_1".into(),
        provider_signature: h.payments.sign("order_prov_1", "pay_1"),
    };

    let first = h.checkout.verify_and_complete(request()).await.unwrap();
    assert!(!first.already_completed);
    assert!(first.admin_notification.as_ref().unwrap().delivered);

    let second = h.checkout.verify_and_complete(request()).await.unwrap();
    assert!(second.already_completed);
    assert_eq!(second.payment_status, "completed");
    assert!(second.email.is_none());
    assert!(second.admin_notification.is_none());

    // expect(1) on the webhook mock verifies no duplicate notification
    // was posted when the server drops.
}

#[tokio::test]
async fn invalid_signature_marks_the_payment_failed() {
    let payment_server = MockServer::start().await;
    let admin_server = MockServer::start().await;
    mount_provider_order(&payment_server, "order_prov_1").await;
    let h = setup(&payment_server, &admin_server).await;

    h.checkout.begin(begin_request()).await.unwrap();

    let err = h
        .checkout
        .verify_and_complete(VerifyPaymentRequest {
            provider_order_id: "order_prov_1".into(),
            provider_payment_id: "pay_1".into(),
            provider_signature: "deadbeef".into(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentFailed(_));

    let order = h.orders.find_by_provider_order("order_prov_1").await.unwrap();
    assert_eq!(order.payment_status, "failed");
    assert_eq!(order.status, "pending");

    // No admin notification is sent for a failed verification.
    assert!(admin_server.received_requests().await.unwrap().is_empty());
}
