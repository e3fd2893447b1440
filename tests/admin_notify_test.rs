use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::config::AdminNotifyConfig;
use storefront_api::services::admin_notify::AdminNotifier;

fn notifier_for(endpoint: Option<String>) -> AdminNotifier {
    AdminNotifier::from_config(&AdminNotifyConfig {
        endpoint_url: endpoint,
    })
}

#[tokio::test]
async fn payload_carries_stringified_metadata_and_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/f/webhook"))
        .and(body_partial_json(json!({
            "subject": "Contact message from Asha",
            "type": "contact"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = notifier_for(Some(format!("{}/f/webhook", server.uri())));
    let outcome = notifier
        .notify_contact_message("Asha", "asha@example.com", "Where is my order?")
        .await;

    assert!(outcome.delivered);
    assert!(outcome.error.is_none());

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();

    // Metadata is a JSON string, not a nested object.
    let metadata = body["metadata"].as_str().expect("metadata is stringified");
    let parsed: Value = serde_json::from_str(metadata).unwrap();
    assert_eq!(parsed["email"], "asha@example.com");

    assert!(body["timestamp"].as_str().is_some());
    assert_eq!(body["message"], "Where is my order?");
}

#[tokio::test]
async fn endpoint_failure_reports_without_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = notifier_for(Some(server.uri()));
    let outcome = notifier.notify_signup("Asha", "asha@example.com").await;

    assert!(!outcome.delivered);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn unconfigured_endpoint_skips_without_network_traffic() {
    let notifier = notifier_for(None);
    let outcome = notifier.notify_signup("Asha", "asha@example.com").await;

    assert!(!outcome.delivered);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("not configured"));
}

#[tokio::test]
async fn single_attempt_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let notifier = notifier_for(Some(server.uri()));
    let _ = notifier
        .notify("status_update", "subject", "message", json!({}))
        .await;

    // Webhook delivery is best effort; no retries.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
