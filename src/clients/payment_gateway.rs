use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::PaymentConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Provider-imposed ceiling on receipt identifiers.
pub const RECEIPT_MAX_LEN: usize = 40;

/// Order record returned by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// Payment record as fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a HashMap<String, String>,
    payment_capture: u8,
}

/// REST client for the hosted payment provider. Credentials are sent as
/// HTTP basic auth on every call.
#[derive(Debug)]
pub struct PaymentGatewayClient {
    http: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    order_timeout: Duration,
    fetch_timeout: Duration,
    fetch_retry_base_delay: Duration,
}

impl PaymentGatewayClient {
    pub fn from_config(config: &PaymentConfig) -> Result<Self, ServiceError> {
        let key_id = config
            .key_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServiceError::ConfigurationError("payment key_id is not set".into())
            })?;
        let key_secret = config
            .key_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServiceError::ConfigurationError("payment key_secret is not set".into())
            })?;

        Ok(Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
            order_timeout: Duration::from_secs(config.order_timeout_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            fetch_retry_base_delay: Duration::from_millis(1000),
        })
    }

    /// Overrides the delay between payment-fetch retries. Used by tests to
    /// keep retry scenarios fast.
    pub fn with_fetch_retry_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_base_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn for_tests(base_url: &str, key_id: &str, key_secret: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            order_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            fetch_retry_base_delay: Duration::from_millis(10),
        }
    }

    fn auth_header(&self) -> String {
        format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", self.key_id, self.key_secret))
        )
    }

    /// Builds a fresh receipt id: prefix, millisecond timestamp, and a
    /// random alphanumeric suffix, truncated to the provider limit.
    pub fn new_receipt(prefix: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        let mut receipt = format!("{}_{}_{}", prefix, millis, suffix);
        receipt.truncate(RECEIPT_MAX_LEN);
        receipt
    }

    /// Creates a provider order in minor currency units with automatic
    /// capture enabled.
    #[instrument(skip(self, notes))]
    pub async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: HashMap<String, String>,
    ) -> Result<ProviderOrder, ServiceError> {
        if amount_minor <= 0 {
            return Err(ServiceError::ValidationError(
                "order amount must be positive".into(),
            ));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServiceError::ValidationError(format!(
                "invalid currency code: {}",
                currency
            )));
        }
        if receipt.is_empty() || receipt.len() > RECEIPT_MAX_LEN {
            return Err(ServiceError::ValidationError(format!(
                "receipt must be 1..={} characters",
                RECEIPT_MAX_LEN
            )));
        }

        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt,
            notes: &notes,
            payment_capture: 1,
        };

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .header("Authorization", self.auth_header())
            .timeout(self.order_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error("provider order creation", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(provider_error_from_body(status.as_u16(), &text));
        }

        let order = response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| ServiceError::provider_error(None, format!("malformed order response: {}", e)))?;

        debug!(provider_order_id = %order.id, "provider order created");
        Ok(order)
    }

    /// Verifies a payment signature: HMAC-SHA256 over `order_id|payment_id`
    /// keyed with the API secret, hex-encoded. Malformed input is an
    /// authentication failure, never an error.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
            return false;
        }

        let expected = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = match HmacSha256::new_from_slice(self.key_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());

        // verify_slice compares in constant time
        mac.verify_slice(&expected).is_ok()
    }

    /// Produces the signature the provider would send for the given pair.
    /// Exposed for test fixtures.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Fetches a payment record, retrying transient failures with linear
    /// backoff (base delay × attempt number).
    #[instrument(skip(self))]
    pub async fn fetch_payment(
        &self,
        payment_id: &str,
        retries: u32,
    ) -> Result<ProviderPayment, ServiceError> {
        let mut last_err = ServiceError::InternalError("payment fetch not attempted".into());

        for attempt in 1..=retries.max(1) {
            match self.fetch_payment_once(payment_id).await {
                Ok(payment) => return Ok(payment),
                Err(e) if e.is_retryable() && attempt < retries => {
                    warn!(
                        payment_id,
                        attempt,
                        error = %e,
                        "payment fetch failed, retrying"
                    );
                    tokio::time::sleep(self.fetch_retry_base_delay * attempt).await;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    async fn fetch_payment_once(&self, payment_id: &str) -> Result<ProviderPayment, ServiceError> {
        let response = self
            .http
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .header("Authorization", self.auth_header())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error("payment fetch", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(provider_error_from_body(status.as_u16(), &text));
        }

        response
            .json::<ProviderPayment>()
            .await
            .map_err(|e| ServiceError::provider_error(None, format!("malformed payment response: {}", e)))
    }
}

/// Maps reqwest transport failures onto the error taxonomy.
pub(crate) fn classify_transport_error(context: &str, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::TimeoutError(format!("{} timed out", context))
    } else if e.is_connect() {
        ServiceError::NetworkError(format!("{} connection failed: {}", context, e))
    } else {
        ServiceError::NetworkError(format!("{} failed: {}", context, e))
    }
}

/// Pulls the provider's error description out of its JSON error envelope,
/// falling back to the raw body.
pub(crate) fn provider_error_from_body(status: u16, body: &str) -> ServiceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/description")
                .or_else(|| v.pointer("/error/message"))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "provider returned an error with no body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        });

    ServiceError::provider_error(status, message)
}
