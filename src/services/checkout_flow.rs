//! Client-side checkout session modeled as an explicit state machine.
//! The flow owns the cart and the checkout form; server calls happen
//! between transitions (`submit` → provider order endpoint,
//! `payment_collected` → verification endpoint).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clients::payment_gateway::PaymentGatewayClient;
use crate::errors::ServiceError;

/// Ephemeral cart line. Never persisted; the server re-snapshots items at
/// order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    /// Major currency units.
    pub price: Decimal,
    pub image_url: Option<String>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl CheckoutForm {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.phone.trim().is_empty()
            && !self.address.trim().is_empty()
    }
}

/// The (provider order, payment, signature) triple handed back by the
/// payment widget on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTriple {
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub provider_signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    /// Customer dismissed the payment widget.
    Cancelled,
    /// Provider order creation or payment collection failed upstream.
    ProviderFailed(String),
    /// Signature verification rejected the payment.
    VerificationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CheckoutState {
    Browsing,
    CartOpen,
    CheckoutFormOpen,
    AwaitingProviderOrder,
    AwaitingPaymentUi { provider_order_id: String },
    AwaitingVerification { triple: VerificationTriple },
    Success,
    Failed { reason: FailureReason },
}

/// What the flow asks the server to create when the form is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrderIntent {
    /// Minor currency units.
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
    pub form: CheckoutForm,
    pub items: Vec<CartItem>,
}

pub struct CheckoutFlow {
    state: CheckoutState,
    cart: Vec<CartItem>,
    form: CheckoutForm,
    customer_id: Option<String>,
    currency: String,
}

impl CheckoutFlow {
    pub fn new(currency: &str) -> Self {
        Self {
            state: CheckoutState::Browsing,
            cart: Vec::new(),
            form: CheckoutForm::default(),
            customer_id: None,
            currency: currency.to_string(),
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn cart(&self) -> &[CartItem] {
        &self.cart
    }

    pub fn form(&self) -> &CheckoutForm {
        &self.form
    }

    pub fn set_customer(&mut self, customer_id: Option<String>) {
        self.customer_id = customer_id;
    }

    pub fn cart_total(&self) -> Decimal {
        self.cart
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum()
    }

    fn ensure_editable(&self) -> Result<(), ServiceError> {
        match self.state {
            CheckoutState::Browsing
            | CheckoutState::CartOpen
            | CheckoutState::CheckoutFormOpen
            | CheckoutState::Failed { .. } => Ok(()),
            _ => Err(ServiceError::InvalidOperation(
                "cart cannot change while payment is in progress".into(),
            )),
        }
    }

    /// Adds an item, merging quantities when the product is already in the
    /// cart.
    pub fn add_to_cart(&mut self, item: CartItem) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if item.quantity == 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".into(),
            ));
        }
        match self.cart.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => self.cart.push(item),
        }
        if matches!(self.state, CheckoutState::Browsing) {
            self.state = CheckoutState::CartOpen;
        }
        Ok(())
    }

    /// Sets an item's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if quantity == 0 {
            self.cart.retain(|i| i.product_id != product_id);
        } else if let Some(item) = self.cart.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
        } else {
            return Err(ServiceError::NotFound(format!(
                "product {} is not in the cart",
                product_id
            )));
        }
        Ok(())
    }

    pub fn open_cart(&mut self) {
        if matches!(self.state, CheckoutState::Browsing) {
            self.state = CheckoutState::CartOpen;
        }
    }

    pub fn open_checkout_form(&mut self) -> Result<(), ServiceError> {
        match self.state {
            CheckoutState::CartOpen | CheckoutState::Failed { .. } => {
                if self.cart.is_empty() {
                    return Err(ServiceError::ValidationError("cart is empty".into()));
                }
                self.state = CheckoutState::CheckoutFormOpen;
                Ok(())
            }
            _ => Err(ServiceError::InvalidOperation(
                "checkout form can only open from the cart".into(),
            )),
        }
    }

    pub fn update_form(&mut self, form: CheckoutForm) -> Result<(), ServiceError> {
        if !matches!(self.state, CheckoutState::CheckoutFormOpen) {
            return Err(ServiceError::InvalidOperation(
                "checkout form is not open".into(),
            ));
        }
        self.form = form;
        Ok(())
    }

    /// Validates the session and produces the provider-order request. On
    /// any guard failure the state is left unchanged so the customer can
    /// correct the form. Each submission gets a fresh receipt id.
    pub fn submit(&mut self) -> Result<ProviderOrderIntent, ServiceError> {
        if !matches!(self.state, CheckoutState::CheckoutFormOpen) {
            return Err(ServiceError::InvalidOperation(
                "checkout form is not open".into(),
            ));
        }
        if self.customer_id.is_none() {
            return Err(ServiceError::AuthError(
                "sign in to complete checkout".into(),
            ));
        }
        if self.cart.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".into()));
        }
        if !self.form.is_complete() {
            return Err(ServiceError::ValidationError(
                "name, email, phone and address are all required".into(),
            ));
        }

        let amount_minor = (self.cart_total() * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::ValidationError("cart total out of range".into())
            })?;
        if amount_minor <= 0 {
            return Err(ServiceError::ValidationError(
                "cart total must be positive".into(),
            ));
        }

        self.state = CheckoutState::AwaitingProviderOrder;
        Ok(ProviderOrderIntent {
            amount_minor,
            currency: self.currency.clone(),
            receipt: PaymentGatewayClient::new_receipt("SP"),
            form: self.form.clone(),
            items: self.cart.clone(),
        })
    }

    pub fn provider_order_created(&mut self, provider_order_id: String) -> Result<(), ServiceError> {
        self.expect_awaiting_provider_order()?;
        self.state = CheckoutState::AwaitingPaymentUi { provider_order_id };
        Ok(())
    }

    pub fn provider_order_failed(&mut self, message: String) -> Result<(), ServiceError> {
        self.expect_awaiting_provider_order()?;
        self.state = CheckoutState::Failed {
            reason: FailureReason::ProviderFailed(message),
        };
        Ok(())
    }

    fn expect_awaiting_provider_order(&self) -> Result<(), ServiceError> {
        if matches!(self.state, CheckoutState::AwaitingProviderOrder) {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(
                "no provider order is pending".into(),
            ))
        }
    }

    /// The payment widget returned a signed triple.
    pub fn payment_collected(&mut self, triple: VerificationTriple) -> Result<(), ServiceError> {
        match &self.state {
            CheckoutState::AwaitingPaymentUi { provider_order_id }
                if *provider_order_id == triple.provider_order_id =>
            {
                self.state = CheckoutState::AwaitingVerification { triple };
                Ok(())
            }
            CheckoutState::AwaitingPaymentUi { .. } => Err(ServiceError::ValidationError(
                "payment does not match the pending provider order".into(),
            )),
            _ => Err(ServiceError::InvalidOperation(
                "no payment is being collected".into(),
            )),
        }
    }

    pub fn payment_cancelled(&mut self) -> Result<(), ServiceError> {
        self.expect_awaiting_payment_ui()?;
        self.state = CheckoutState::Failed {
            reason: FailureReason::Cancelled,
        };
        Ok(())
    }

    pub fn payment_failed(&mut self, message: String) -> Result<(), ServiceError> {
        self.expect_awaiting_payment_ui()?;
        self.state = CheckoutState::Failed {
            reason: FailureReason::ProviderFailed(message),
        };
        Ok(())
    }

    fn expect_awaiting_payment_ui(&self) -> Result<(), ServiceError> {
        if matches!(self.state, CheckoutState::AwaitingPaymentUi { .. }) {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(
                "no payment is being collected".into(),
            ))
        }
    }

    /// Server verification confirmed the payment. Only here is the cart
    /// cleared and the form reset.
    pub fn verification_succeeded(&mut self) -> Result<(), ServiceError> {
        if !matches!(self.state, CheckoutState::AwaitingVerification { .. }) {
            return Err(ServiceError::InvalidOperation(
                "no verification is pending".into(),
            ));
        }
        self.cart.clear();
        self.form = CheckoutForm::default();
        self.state = CheckoutState::Success;
        Ok(())
    }

    pub fn verification_failed(&mut self, message: String) -> Result<(), ServiceError> {
        if !matches!(self.state, CheckoutState::AwaitingVerification { .. }) {
            return Err(ServiceError::InvalidOperation(
                "no verification is pending".into(),
            ));
        }
        self.state = CheckoutState::Failed {
            reason: FailureReason::VerificationFailed(message),
        };
        Ok(())
    }

    /// Recovers from a failed attempt. The cart and form survive; the next
    /// submission generates a fresh receipt id.
    pub fn retry(&mut self) -> Result<(), ServiceError> {
        match self.state {
            CheckoutState::Failed { .. } => {
                if self.cart.is_empty() {
                    self.state = CheckoutState::Browsing;
                } else {
                    self.state = CheckoutState::CheckoutFormOpen;
                }
                Ok(())
            }
            _ => Err(ServiceError::InvalidOperation(
                "retry is only possible after a failure".into(),
            )),
        }
    }
}
