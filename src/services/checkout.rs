use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clients::payment_gateway::PaymentGatewayClient;
use crate::errors::ServiceError;
use crate::services::admin_notify::{AdminNotifier, NotifyOutcome};
use crate::services::email::{DeliveryReport, EmailService, OutgoingEmail};
use crate::services::orders::{NewOrder, NewOrderItem, OrderService};
use crate::services::templates;

#[derive(Debug, Deserialize)]
pub struct BeginCheckoutRequest {
    pub user_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub items: Vec<NewOrderItem>,
    /// Receipt from the client session; a fresh one is generated when
    /// absent.
    pub receipt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub provider_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub provider_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub already_completed: bool,
    /// Post-payment side-effect outcomes, reported for observability.
    /// Absent on idempotent replays, which run no side effects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<DeliveryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notification: Option<NotifyOutcome>,
}

/// Server side of the checkout: provider order creation and payment
/// verification with post-payment fan-out.
pub struct CheckoutService {
    orders: Arc<OrderService>,
    payments: Arc<PaymentGatewayClient>,
    email: Arc<EmailService>,
    admin: Arc<AdminNotifier>,
    currency: String,
    site_url: String,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<OrderService>,
        payments: Arc<PaymentGatewayClient>,
        email: Arc<EmailService>,
        admin: Arc<AdminNotifier>,
        currency: String,
        site_url: String,
    ) -> Self {
        Self {
            orders,
            payments,
            email,
            admin,
            currency,
            site_url,
        }
    }

    /// Creates the provider order and the matching pending local order.
    /// The request is fully validated first so an invalid submission never
    /// leaves an orphaned order at the provider.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn begin(
        &self,
        request: BeginCheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        let new_order = NewOrder {
            user_id: request.user_id,
            customer_name: request.customer_name,
            customer_email: request.customer_email,
            customer_phone: request.customer_phone,
            shipping_address: request.shipping_address,
            items: request.items,
        };
        new_order.validate()?;
        for item in &new_order.items {
            item.validate()?;
            if item.product_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "item {} has a non-positive price",
                    item.product_id
                )));
            }
        }

        let total: Decimal = new_order
            .items
            .iter()
            .map(|i| i.product_price * Decimal::from(i.quantity))
            .sum();
        let amount_minor = (total * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| ServiceError::ValidationError("order total out of range".into()))?;

        let receipt = request
            .receipt
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| PaymentGatewayClient::new_receipt("SP"));

        let mut notes = HashMap::new();
        notes.insert(
            "customer_email".to_string(),
            new_order.customer_email.clone(),
        );
        notes.insert("receipt".to_string(), receipt.clone());

        let provider_order = self
            .payments
            .create_order(amount_minor, &self.currency, &receipt, notes)
            .await?;

        let (order, _items) = self
            .orders
            .create_pending_order(new_order, Some(provider_order.id.clone()))
            .await?;

        info!(order_id = %order.id, provider_order_id = %provider_order.id, "checkout started");
        Ok(CheckoutResponse {
            order_id: order.id,
            provider_order_id: provider_order.id,
            amount_minor,
            currency: self.currency.clone(),
            receipt,
        })
    }

    /// Verifies the payment signature and completes the order. Completion
    /// is idempotent; customer email and admin notification run
    /// concurrently afterwards and their failures never block the verified
    /// outcome.
    #[instrument(skip(self, request), fields(provider_order_id = %request.provider_order_id))]
    pub async fn verify_and_complete(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        let verified = self.payments.verify_signature(
            &request.provider_order_id,
            &request.provider_payment_id,
            &request.provider_signature,
        );

        if !verified {
            if let Ok(order) = self
                .orders
                .find_by_provider_order(&request.provider_order_id)
                .await
            {
                let _ = self
                    .orders
                    .mark_payment_failed(order.id, "signature verification failed")
                    .await;
            }
            return Err(ServiceError::PaymentFailed(
                "payment signature verification failed".into(),
            ));
        }

        let order = self
            .orders
            .find_by_provider_order(&request.provider_order_id)
            .await?;

        // Best effort: the payment method is informational only.
        let payment_method = match self
            .payments
            .fetch_payment(&request.provider_payment_id, 3)
            .await
        {
            Ok(payment) => payment.method,
            Err(e) => {
                warn!(error = %e, "payment record fetch failed; continuing without method");
                None
            }
        };

        let (order, already_completed) = self
            .orders
            .mark_payment_completed(
                order.id,
                &request.provider_payment_id,
                &request.provider_signature,
                payment_method,
            )
            .await?;

        if already_completed {
            // Replay of a verified triple: confirm without re-running side
            // effects.
            return Ok(VerifyPaymentResponse {
                order_id: order.id,
                status: order.status,
                payment_status: order.payment_status,
                already_completed: true,
                email: None,
                admin_notification: None,
            });
        }

        let (_, items) = self.orders.get_order_with_items(order.id).await?;
        let (subject, html) = templates::order_confirmation(&order, &items, &self.site_url);
        let outgoing = OutgoingEmail {
            to: order.customer_email.clone(),
            subject,
            html,
        };

        let (email_report, admin_outcome) = tokio::join!(
            self.email.send(&outgoing),
            self.admin.notify_new_order(&order, items.len()),
        );

        if !email_report.delivered {
            warn!(target: "email", order_id = %order.id, "confirmation email not delivered");
        }
        if !admin_outcome.delivered {
            warn!(target: "admin_notify", order_id = %order.id, "new-order notification not delivered");
        }

        Ok(VerifyPaymentResponse {
            order_id: order.id,
            status: order.status,
            payment_status: order.payment_status,
            already_completed: false,
            email: Some(email_report),
            admin_notification: Some(admin_outcome),
        })
    }
}
