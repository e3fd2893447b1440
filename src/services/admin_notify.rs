use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::config::AdminNotifyConfig;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::invoices::format_inr;

/// Result of one webhook delivery. Failures are reported, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort webhook notifier for operational events. One attempt per
/// event; an unreachable endpoint degrades to a warning.
pub struct AdminNotifier {
    http: Client,
    endpoint_url: Option<String>,
}

impl AdminNotifier {
    pub fn from_config(config: &AdminNotifyConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint_url: config.endpoint_url.clone().filter(|s| !s.is_empty()),
        }
    }

    /// Posts one event summary. The metadata map is stringified so the
    /// receiving form service renders it as a single field.
    #[instrument(skip(self, message, metadata))]
    pub async fn notify(
        &self,
        event_type: &str,
        subject: &str,
        message: &str,
        metadata: Value,
    ) -> NotifyOutcome {
        let endpoint = match &self.endpoint_url {
            Some(url) => url,
            None => {
                warn!(target: "admin_notify", "endpoint not configured; notification skipped");
                return NotifyOutcome {
                    delivered: false,
                    error: Some("admin notification endpoint is not configured".into()),
                };
            }
        };

        let payload = json!({
            "subject": subject,
            "message": message,
            "type": event_type,
            "metadata": metadata.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        match self.post(endpoint, &payload).await {
            Ok(()) => {
                info!(target: "admin_notify", event_type, "admin notification delivered");
                NotifyOutcome {
                    delivered: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(target: "admin_notify", event_type, error = %e, "admin notification failed");
                NotifyOutcome {
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> Result<(), ServiceError> {
        let response = self
            .http
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| ServiceError::NetworkError(format!("webhook post failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::provider_error(
                status.as_u16(),
                "webhook endpoint returned an error",
            ));
        }
        Ok(())
    }

    pub async fn notify_new_order(&self, order: &order::Model, item_count: usize) -> NotifyOutcome {
        self.notify(
            "new_order",
            &format!("New order: {}", format_inr(order.total_amount)),
            &format!(
                "{} placed an order for {} item(s), total {}.",
                order.customer_name,
                item_count,
                format_inr(order.total_amount)
            ),
            json!({
                "order_id": order.id,
                "customer_email": order.customer_email,
                "total_amount": order.total_amount,
                "payment_status": order.payment_status,
            }),
        )
        .await
    }

    pub async fn notify_contact_message(
        &self,
        name: &str,
        email: &str,
        message: &str,
    ) -> NotifyOutcome {
        self.notify(
            "contact",
            &format!("Contact message from {}", name),
            message,
            json!({ "name": name, "email": email }),
        )
        .await
    }

    pub async fn notify_signup(&self, name: &str, email: &str) -> NotifyOutcome {
        self.notify(
            "signup",
            "New customer signup",
            &format!("{} ({}) created an account.", name, email),
            json!({ "name": name, "email": email }),
        )
        .await
    }

    pub async fn notify_return_request(
        &self,
        order: &order::Model,
        reason: &str,
        refund_estimate: rust_decimal::Decimal,
    ) -> NotifyOutcome {
        self.notify(
            "return_request",
            &format!("Return requested for order {}", order.id),
            &format!(
                "{} requested a return. Reason: {}. Estimated refund {}.",
                order.customer_name,
                reason,
                format_inr(refund_estimate)
            ),
            json!({
                "order_id": order.id,
                "customer_email": order.customer_email,
                "refund_estimate": refund_estimate,
            }),
        )
        .await
    }

    pub async fn notify_status_change(
        &self,
        order: &order::Model,
        old_status: &str,
        new_status: &str,
    ) -> NotifyOutcome {
        self.notify(
            "status_update",
            &format!("Order {} is now {}", order.id, new_status),
            &format!(
                "Status changed from {} to {} for {}.",
                old_status, new_status, order.customer_name
            ),
            json!({
                "order_id": order.id,
                "old_status": old_status,
                "new_status": new_status,
            }),
        )
        .await
    }
}
