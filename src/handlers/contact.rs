use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::events::Event;
use crate::services::admin_notify::NotifyOutcome;
use crate::services::email::{DeliveryReport, OutgoingEmail};
use crate::services::templates;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/contact", post(contact))
        .route("/signups", post(signup))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "Message cannot be empty"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationOutcomes {
    pub email: DeliveryReport,
    pub admin_notification: NotifyOutcome,
}

/// Accepts a contact message: acknowledges the customer by email and
/// forwards the message to the admin channel. Only invalid input fails the
/// request; delivery outcomes are reported in the body.
async fn contact(
    State(state): State<AppState>,
    Json(request): Json<ContactRequest>,
) -> ApiResult<NotificationOutcomes> {
    request.validate()?;

    let (subject, html) = templates::contact_acknowledgement(&request.name, &state.config.site_url);
    let outgoing = OutgoingEmail {
        to: request.email.clone(),
        subject,
        html,
    };

    let (email, admin_notification) = tokio::join!(
        state.services.email.send(&outgoing),
        state
            .services
            .admin_notify
            .notify_contact_message(&request.name, &request.email, &request.message),
    );

    if let Err(e) = state
        .event_sender
        .send(Event::ContactMessageReceived {
            email: request.email,
        })
        .await
    {
        warn!("failed to emit contact event: {}", e);
    }

    Ok(Json(ApiResponse::success(NotificationOutcomes {
        email,
        admin_notification,
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
}

/// Sends the welcome email for a new account and notifies the admin
/// channel.
async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<NotificationOutcomes> {
    request.validate()?;

    let (subject, html) = templates::signup_welcome(&request.name, &state.config.site_url);
    let outgoing = OutgoingEmail {
        to: request.email.clone(),
        subject,
        html,
    };

    let (email, admin_notification) = tokio::join!(
        state.services.email.send(&outgoing),
        state
            .services
            .admin_notify
            .notify_signup(&request.name, &request.email),
    );

    if let Err(e) = state
        .event_sender
        .send(Event::CustomerSignedUp {
            email: request.email,
        })
        .await
    {
        warn!("failed to emit signup event: {}", e);
    }

    Ok(Json(ApiResponse::success(NotificationOutcomes {
        email,
        admin_notification,
    })))
}
