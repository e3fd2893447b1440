use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tokio::sync::mpsc;

use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::{order, order_item};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::services::orders::{NewOrder, NewOrderItem, OrderService};

async fn setup() -> (OrderService, mpsc::Receiver<storefront_api::events::Event>) {
    let db: DatabaseConnection = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    let schema = Schema::new(db.get_database_backend());
    for stmt in [
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
    ] {
        db.execute(db.get_database_backend().build(&stmt))
            .await
            .expect("create table");
    }

    let (tx, rx) = mpsc::channel(64);
    (OrderService::new(db, EventSender::new(tx)), rx)
}

fn new_order() -> NewOrder {
    NewOrder {
        user_id: "user_1".into(),
        customer_name: "Asha Rao".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: "+911234567890".into(),
        shipping_address: "221B Residency Road, Bengaluru".into(),
        items: vec![
            NewOrderItem {
                product_id: "prod_kurta".into(),
                product_name: "Cotton Kurta".into(),
                product_price: dec!(1499),
                quantity: 1,
            },
            NewOrderItem {
                product_id: "prod_scarf".into(),
                product_name: "Silk Scarf".into(),
                product_price: dec!(799),
                quantity: 2,
            },
        ],
    }
}

#[tokio::test]
async fn order_total_is_computed_from_items() {
    let (svc, _rx) = setup().await;

    let (order, items) = svc
        .create_pending_order(new_order(), Some("order_prov".into()))
        .await
        .unwrap();

    assert_eq!(order.total_amount, dec!(3097));
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "pending");
    assert_eq!(order.provider_order_id.as_deref(), Some("order_prov"));
    assert_eq!(items.len(), 2);

    let (_, fetched_items) = svc.get_order_with_items(order.id).await.unwrap();
    assert_eq!(fetched_items.len(), 2);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let (svc, _rx) = setup().await;
    let mut request = new_order();
    request.items.clear();

    let err = svc.create_pending_order(request, None).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn payment_completion_is_idempotent() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc
        .create_pending_order(new_order(), Some("order_prov".into()))
        .await
        .unwrap();

    let (completed, already) = svc
        .mark_payment_completed(order.id, "pay_1", "sig_1", Some("upi".into()))
        .await
        .unwrap();
    assert!(!already);
    assert_eq!(completed.payment_status, "completed");
    assert_eq!(completed.status, "confirmed");
    assert_eq!(completed.provider_payment_id.as_deref(), Some("pay_1"));

    // Replay with the same payment id: no-op.
    let (replayed, already) = svc
        .mark_payment_completed(order.id, "pay_1", "sig_1", None)
        .await
        .unwrap();
    assert!(already);
    assert_eq!(replayed.payment_method.as_deref(), Some("upi"));

    // A different payment against a paid order is refused.
    let err = svc
        .mark_payment_completed(order.id, "pay_2", "sig_2", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn failed_payment_keeps_order_retryable() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc
        .create_pending_order(new_order(), Some("order_prov".into()))
        .await
        .unwrap();

    let failed = svc
        .mark_payment_failed(order.id, "signature verification failed")
        .await
        .unwrap();
    assert_eq!(failed.payment_status, "failed");
    assert_eq!(failed.status, "pending");

    // A later successful verification still completes the order.
    let (completed, already) = svc
        .mark_payment_completed(order.id, "pay_1", "sig_1", None)
        .await
        .unwrap();
    assert!(!already);
    assert_eq!(completed.payment_status, "completed");
}

#[tokio::test]
async fn status_transitions_are_monotonic() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc.create_pending_order(new_order(), None).await.unwrap();

    let (updated, old) = svc
        .update_status(order.id, OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(old, "pending");
    assert_eq!(updated.status, "confirmed");

    svc.update_status(order.id, OrderStatus::Shipped).await.unwrap();
    svc.update_status(order.id, OrderStatus::Delivered).await.unwrap();

    // Nothing moves after delivery, not even cancellation.
    let err = svc
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let err = svc
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn cancellation_allowed_before_delivery() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc.create_pending_order(new_order(), None).await.unwrap();

    svc.update_status(order.id, OrderStatus::Confirmed).await.unwrap();
    let (cancelled, _) = svc
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let err = svc
        .update_status(order.id, OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn shipment_fields_attach_to_the_order() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc.create_pending_order(new_order(), None).await.unwrap();

    let updated = svc
        .attach_shipment(
            order.id,
            4242,
            Some("AWB0001".into()),
            Some("Delhivery".into()),
            Some("https://shiprocket.co/tracking/AWB0001".into()),
        )
        .await
        .unwrap();

    assert_eq!(updated.shipment_id, Some(4242));
    assert_eq!(updated.awb_code.as_deref(), Some("AWB0001"));
    assert_eq!(updated.courier_name.as_deref(), Some("Delhivery"));
}

#[tokio::test]
async fn lookup_by_provider_order_id() {
    let (svc, _rx) = setup().await;
    let (order, _) = svc
        .create_pending_order(new_order(), Some("order_find_me".into()))
        .await
        .unwrap();

    let found = svc.find_by_provider_order("order_find_me").await.unwrap();
    assert_eq!(found.id, order.id);

    let err = svc.find_by_provider_order("order_unknown").await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
