use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;
use crate::services::admin_notify::NotifyOutcome;
use crate::services::email::{DeliveryReport, OutgoingEmail};
use crate::services::invoices::InvoiceRenderer;
use crate::services::templates;
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
        .route("/orders/:id/invoice", get(download_invoice))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20);
    let (items, total) = state.services.orders.list_orders(page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        per_page,
    })))
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<crate::entities::order_item::Model>,
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderWithItems> {
    let (order, items) = state.services.orders.get_order_with_items(id).await?;
    Ok(Json(ApiResponse::success(OrderWithItems { order, items })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub order: order::Model,
    pub old_status: String,
    pub email: DeliveryReport,
    pub admin_notification: NotifyOutcome,
}

/// Moves an order along the fulfillment lifecycle and notifies the
/// customer and the admin channel. Notification failures are reported in
/// the response, not raised.
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<StatusUpdateResponse> {
    let new_status = OrderStatus::from_str(&request.status)
        .map_err(ServiceError::ValidationError)?;

    let (order, old_status) = state.services.orders.update_status(id, new_status).await?;
    let status_label = new_status.to_string();

    let (subject, html) = templates::status_update(&order, &status_label, &state.config.site_url);
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
            .notify_status_change(&order, &old_status, &status_label),
    );

    if !email.delivered {
        warn!(target: "email", order_id = %order.id, "status email not delivered");
    }

    Ok(Json(ApiResponse::success(StatusUpdateResponse {
        order,
        old_status,
        email,
        admin_notification,
    })))
}

/// Streams the order invoice as a PDF attachment.
async fn download_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let (order, items) = state.services.orders.get_order_with_items(id).await?;
    let pdf = InvoiceRenderer::render(&order, &items)?;

    let filename = format!("invoice-{}.pdf", order.id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    )
        .into_response())
}
