use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::clients::shipping::{ReturnRequest as ProviderReturnRequest, ShipmentItem};
use crate::entities::order::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::admin_notify::NotifyOutcome;
use crate::services::email::{DeliveryReport, OutgoingEmail};
use crate::services::invoices::format_date;
use crate::services::templates;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/returns", post(request_return))
}

/// Structured pickup address; when present, a return pickup is registered
/// with the shipping provider immediately.
#[derive(Debug, Deserialize)]
pub struct ReturnPickup {
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub weight_kg: f64,
}

fn default_country() -> String {
    "India".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    pub reason: String,
    /// Share of the order value refunded; defaults to the full amount.
    pub refund_percent: Option<u32>,
    pub pickup: Option<ReturnPickup>,
}

#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub order: order::Model,
    pub refund_estimate: Decimal,
    pub provider_return_id: Option<i64>,
    pub email: DeliveryReport,
    pub admin_notification: NotifyOutcome,
}

/// Records a return request: refund estimate, customer acknowledgement,
/// admin notification, and (when pickup details are supplied) a return
/// order at the shipping provider.
async fn request_return(
    State(state): State<AppState>,
    Json(request): Json<CreateReturnRequest>,
) -> ApiResult<ReturnResponse> {
    if request.reason.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "a return reason is required".into(),
        ));
    }
    let percent = request.refund_percent.unwrap_or(100);
    if percent == 0 || percent > 100 {
        return Err(ServiceError::ValidationError(
            "refund percent must be between 1 and 100".into(),
        ));
    }

    let (order, items) = state
        .services
        .orders
        .get_order_with_items(request.order_id)
        .await?;

    if order.payment_status != PaymentStatus::Completed.to_string() {
        return Err(ServiceError::InvalidOperation(
            "returns are only possible for paid orders".into(),
        ));
    }

    let refund_estimate =
        order.total_amount * Decimal::from(percent) / Decimal::from(100);

    let provider_return_id = match &request.pickup {
        Some(pickup) => {
            let provider_request = ProviderReturnRequest {
                order_id: format!("{}-RET", order.id),
                order_date: format_date(chrono::Utc::now()),
                pickup_customer_name: order.customer_name.clone(),
                pickup_address: order.shipping_address.clone(),
                pickup_city: pickup.city.clone(),
                pickup_pincode: pickup.pincode.clone(),
                pickup_state: pickup.state.clone(),
                pickup_country: pickup.country.clone(),
                pickup_email: order.customer_email.clone(),
                pickup_phone: order.customer_phone.clone(),
                shipping_customer_name: "Warehouse".to_string(),
                shipping_address: state
                    .services
                    .shipping
                    .default_pickup_location()
                    .to_string(),
                shipping_city: String::new(),
                shipping_pincode: String::new(),
                shipping_state: String::new(),
                shipping_country: pickup.country.clone(),
                order_items: items
                    .iter()
                    .map(|i| ShipmentItem {
                        name: i.product_name.clone(),
                        sku: i.product_id.clone(),
                        units: i.quantity,
                        selling_price: i.product_price.to_f64().unwrap_or(0.0),
                    })
                    .collect(),
                payment_method: "Prepaid".to_string(),
                sub_total: order.total_amount.to_f64().unwrap_or(0.0),
                length: 10.0,
                breadth: 10.0,
                height: 10.0,
                weight: pickup.weight_kg,
            };
            match state.services.shipping.create_return(&provider_request).await {
                Ok(created) => Some(created.shipment_id),
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "provider return creation failed");
                    None
                }
            }
        }
        None => None,
    };

    let (subject, html) =
        templates::return_acknowledgement(&order, refund_estimate, &state.config.site_url);
    let outgoing = OutgoingEmail {
        to: order.customer_email.clone(),
        subject,
        html,
    };

    let (email, admin_notification) = tokio::join!(
        state.services.email.send(&outgoing),
        state
            .services
            .admin_notify
            .notify_return_request(&order, &request.reason, refund_estimate),
    );

    if let Err(e) = state
        .event_sender
        .send(Event::ReturnRequested { order_id: order.id })
        .await
    {
        warn!("failed to emit return event: {}", e);
    }

    Ok(Json(ApiResponse::success(ReturnResponse {
        order,
        refund_estimate,
        provider_return_id,
        email,
        admin_notification,
    })))
}
