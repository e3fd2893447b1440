pub mod admin_notify;
pub mod checkout;
pub mod checkout_flow;
pub mod email;
pub mod invoices;
pub mod orders;
pub mod templates;

use std::sync::Arc;

use crate::clients::payment_gateway::PaymentGatewayClient;
use crate::clients::shipping::ShippingClient;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;

/// Shared service container handed to every handler through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<orders::OrderService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub payments: Arc<PaymentGatewayClient>,
    pub shipping: Arc<ShippingClient>,
    pub email: Arc<email::EmailService>,
    pub admin_notify: Arc<admin_notify::AdminNotifier>,
}

impl AppServices {
    pub fn build(
        db: DbPool,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let payments = Arc::new(PaymentGatewayClient::from_config(&config.payment)?);
        let shipping = Arc::new(ShippingClient::from_config(&config.shipping));
        let email = Arc::new(email::EmailService::from_config(
            &config.email,
            config.is_development(),
        ));
        let admin_notify = Arc::new(admin_notify::AdminNotifier::from_config(
            &config.admin_notify,
        ));
        let orders = Arc::new(orders::OrderService::new(db, event_sender));
        let checkout = Arc::new(checkout::CheckoutService::new(
            orders.clone(),
            payments.clone(),
            email.clone(),
            admin_notify.clone(),
            config.currency.clone(),
            config.site_url.clone(),
        ));

        Ok(Self {
            orders,
            checkout,
            payments,
            shipping,
            email,
            admin_notify,
        })
    }
}
