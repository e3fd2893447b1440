use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::clients::shipping::{
    AwbData, CourierOption, ShipmentItem, ShipmentRequest,
};
use crate::entities::order::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::invoices::format_date;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shipments", post(create_shipment))
        .route("/shipments/serviceability", post(check_serviceability))
        .route("/shipments/:shipment_id/awb", post(assign_awb))
        .route("/shipments/label", post(generate_label))
        .route("/shipments/track/:order_id", get(track))
        .route("/shipments/cancel", post(cancel))
        .route("/shipments/pickup-locations", get(pickup_locations))
        .route("/shipments/channels", get(channels))
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub order_id: Uuid,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub weight_kg: f64,
    #[serde(default = "default_dimension")]
    pub length_cm: f64,
    #[serde(default = "default_dimension")]
    pub breadth_cm: f64,
    #[serde(default = "default_dimension")]
    pub height_cm: f64,
    /// Pin a courier during AWB assignment; provider picks otherwise.
    pub courier_id: Option<i64>,
}

fn default_country() -> String {
    "India".to_string()
}

fn default_dimension() -> f64 {
    10.0
}

#[derive(Debug, Serialize)]
pub struct ShipmentResponse {
    pub order: order::Model,
    pub shipment_id: i64,
    pub awb: Option<AwbData>,
}

/// Registers a shipment for a paid order, assigns an AWB, and writes the
/// tracking fields back onto the order.
async fn create_shipment(
    State(state): State<AppState>,
    Json(request): Json<CreateShipmentRequest>,
) -> ApiResult<ShipmentResponse> {
    let (order, items) = state
        .services
        .orders
        .get_order_with_items(request.order_id)
        .await?;

    if order.payment_status != PaymentStatus::Completed.to_string() {
        return Err(ServiceError::InvalidOperation(
            "shipments can only be created for paid orders".into(),
        ));
    }
    if order.shipment_id.is_some() {
        return Err(ServiceError::InvalidOperation(
            "order already has a shipment".into(),
        ));
    }

    let shipping = &state.services.shipping;
    let shipment_request = ShipmentRequest {
        order_id: order.id.to_string(),
        order_date: format_date(order.created_at),
        pickup_location: shipping.default_pickup_location().to_string(),
        billing_customer_name: order.customer_name.clone(),
        billing_last_name: String::new(),
        billing_address: order.shipping_address.clone(),
        billing_city: request.city,
        billing_pincode: request.pincode,
        billing_state: request.state,
        billing_country: request.country,
        billing_email: order.customer_email.clone(),
        billing_phone: order.customer_phone.clone(),
        shipping_is_billing: true,
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
        length: request.length_cm,
        breadth: request.breadth_cm,
        height: request.height_cm,
        weight: request.weight_kg,
    };

    let created = shipping.create_shipment(&shipment_request).await?;

    // AWB assignment can fail independently (e.g. no courier available);
    // the shipment still exists, so degrade instead of failing the call.
    let awb = match shipping
        .assign_awb(created.shipment_id, request.courier_id)
        .await
    {
        Ok(awb) => Some(awb),
        Err(e) => {
            warn!(
                shipment_id = created.shipment_id,
                error = %e,
                "awb assignment failed; shipment created without tracking"
            );
            None
        }
    };

    let tracking_url = awb
        .as_ref()
        .map(|a| format!("https://shiprocket.co/tracking/{}", a.awb_code));

    let order = state
        .services
        .orders
        .attach_shipment(
            order.id,
            created.shipment_id,
            awb.as_ref().map(|a| a.awb_code.clone()),
            awb.as_ref().and_then(|a| a.courier_name.clone()),
            tracking_url,
        )
        .await?;

    Ok(Json(ApiResponse::success(ShipmentResponse {
        order,
        shipment_id: created.shipment_id,
        awb,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ServiceabilityRequest {
    pub pickup_postcode: String,
    pub delivery_postcode: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub cod: bool,
}

async fn check_serviceability(
    State(state): State<AppState>,
    Json(request): Json<ServiceabilityRequest>,
) -> ApiResult<Vec<CourierOption>> {
    let couriers = state
        .services
        .shipping
        .check_serviceability(
            &request.pickup_postcode,
            &request.delivery_postcode,
            request.weight_kg,
            request.cod,
        )
        .await?;
    Ok(Json(ApiResponse::success(couriers)))
}

#[derive(Debug, Deserialize)]
pub struct AssignAwbRequest {
    pub courier_id: Option<i64>,
}

async fn assign_awb(
    State(state): State<AppState>,
    Path(shipment_id): Path<i64>,
    Json(request): Json<AssignAwbRequest>,
) -> ApiResult<AwbData> {
    let awb = state
        .services
        .shipping
        .assign_awb(shipment_id, request.courier_id)
        .await?;
    Ok(Json(ApiResponse::success(awb)))
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub shipment_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub label_url: Option<String>,
}

async fn generate_label(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> ApiResult<LabelResponse> {
    let label_url = state
        .services
        .shipping
        .generate_label(&request.shipment_ids)
        .await?;
    Ok(Json(ApiResponse::success(LabelResponse { label_url })))
}

async fn track(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Value> {
    let tracking = state.services.shipping.track_by_order(&order_id).await?;
    Ok(Json(ApiResponse::success(tracking)))
}

#[derive(Debug, Deserialize)]
pub struct CancelShipmentsRequest {
    pub ids: Vec<i64>,
}

async fn cancel(
    State(state): State<AppState>,
    Json(request): Json<CancelShipmentsRequest>,
) -> ApiResult<&'static str> {
    state.services.shipping.cancel_shipments(&request.ids).await?;
    Ok(Json(ApiResponse::success("cancelled")))
}

async fn pickup_locations(State(state): State<AppState>) -> ApiResult<Value> {
    let locations = state.services.shipping.pickup_locations().await?;
    Ok(Json(ApiResponse::success(locations)))
}

async fn channels(State(state): State<AppState>) -> ApiResult<Value> {
    let channels = state.services.shipping.channels().await?;
    Ok(Json(ApiResponse::success(channels)))
}
