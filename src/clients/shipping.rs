use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::clients::payment_gateway::{classify_transport_error, provider_error_from_body};
use crate::config::ShippingConfig;
use crate::errors::ServiceError;

/// Bearer token with its local expiry bound.
#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// New shipment request. Field names follow the provider's wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRequest {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_is_billing: bool,
    pub order_items: Vec<ShipmentItem>,
    pub payment_method: String,
    pub sub_total: f64,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: i32,
    pub selling_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentCreated {
    pub order_id: i64,
    pub shipment_id: i64,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwbData {
    pub awb_code: String,
    pub courier_company_id: Option<i64>,
    pub courier_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AwbResponse {
    response: AwbEnvelope,
}

#[derive(Debug, Deserialize)]
struct AwbEnvelope {
    data: AwbData,
}

/// One courier option from a serviceability query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierOption {
    pub courier_company_id: i64,
    pub courier_name: String,
    pub rate: f64,
    pub etd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    data: ServiceabilityData,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnRequest {
    pub order_id: String,
    pub order_date: String,
    pub pickup_customer_name: String,
    pub pickup_address: String,
    pub pickup_city: String,
    pub pickup_pincode: String,
    pub pickup_state: String,
    pub pickup_country: String,
    pub pickup_email: String,
    pub pickup_phone: String,
    pub shipping_customer_name: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_pincode: String,
    pub shipping_state: String,
    pub shipping_country: String,
    pub order_items: Vec<ShipmentItem>,
    pub payment_method: String,
    pub sub_total: f64,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

/// Logistics provider client. Authentication issues a bearer token valid
/// for ten hours; the token is cached and refreshed under a lock so
/// concurrent callers trigger at most one login.
pub struct ShippingClient {
    http: Client,
    base_url: String,
    email: Option<String>,
    password: Option<String>,
    pickup_location: String,
    track_timeout: Duration,
    token_ttl: ChronoDuration,
    token: Mutex<Option<CachedToken>>,
}

impl ShippingClient {
    pub fn from_config(config: &ShippingConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone().filter(|s| !s.is_empty()),
            password: config.password.clone().filter(|s| !s.is_empty()),
            pickup_location: config.pickup_location.clone(),
            track_timeout: Duration::from_secs(config.track_timeout_secs),
            token_ttl: ChronoDuration::hours(10),
            token: Mutex::new(None),
        }
    }

    /// Overrides the token validity window. Used by tests to exercise
    /// expiry without waiting out the real ten hours.
    pub fn with_token_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn default_pickup_location(&self) -> &str {
        &self.pickup_location
    }

    /// Returns a valid bearer token, logging in only when the cached token
    /// is missing or past its expiry. The whole check-and-refresh runs
    /// under one lock.
    async fn authenticate(&self) -> Result<String, ServiceError> {
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if Utc::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let email = self.email.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError("shipping credentials are not set".into())
        })?;
        let password = self.password.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError("shipping credentials are not set".into())
        })?;

        let response = self
            .http
            .post(format!("{}/v1/external/auth/login", self.base_url))
            .json(&LoginBody { email, password })
            .send()
            .await
            .map_err(|e| classify_transport_error("shipping login", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::AuthError(format!(
                "shipping login rejected ({}): {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let login = response.json::<LoginResponse>().await.map_err(|e| {
            ServiceError::AuthError(format!("malformed shipping login response: {}", e))
        })?;

        let cached = CachedToken {
            token: login.token.clone(),
            expires_at: Utc::now() + self.token_ttl,
        };
        *guard = Some(cached);
        info!("shipping provider token refreshed");

        Ok(login.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<T, ServiceError> {
        let token = self.authenticate().await?;
        let mut req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let response = req
            .send()
            .await
            .map_err(|e| classify_transport_error("shipping request", e))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        let token = self.authenticate().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error("shipping request", e))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(provider_error_from_body(status.as_u16(), &text));
        }
        response.json::<T>().await.map_err(|e| {
            ServiceError::provider_error(None, format!("malformed shipping response: {}", e))
        })
    }

    /// Registers a shipment for a paid order.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentCreated, ServiceError> {
        let created: ShipmentCreated = self
            .post_json("/v1/external/orders/create/adhoc", request)
            .await?;
        debug!(shipment_id = created.shipment_id, "shipment registered");
        Ok(created)
    }

    /// Lists couriers able to carry a parcel between two pincodes.
    pub async fn check_serviceability(
        &self,
        pickup_postcode: &str,
        delivery_postcode: &str,
        weight_kg: f64,
        cod: bool,
    ) -> Result<Vec<CourierOption>, ServiceError> {
        let path = format!(
            "/v1/external/courier/serviceability/?pickup_postcode={}&delivery_postcode={}&weight={}&cod={}",
            pickup_postcode,
            delivery_postcode,
            weight_kg,
            if cod { 1 } else { 0 }
        );
        let response: ServiceabilityResponse = self.get_json(&path, None).await?;
        Ok(response.data.available_courier_companies)
    }

    /// Assigns an air waybill, optionally pinning a specific courier.
    pub async fn assign_awb(
        &self,
        shipment_id: i64,
        courier_id: Option<i64>,
    ) -> Result<AwbData, ServiceError> {
        let mut body = serde_json::json!({ "shipment_id": shipment_id });
        if let Some(courier) = courier_id {
            body["courier_id"] = courier.into();
        }
        let response: AwbResponse = self.post_json("/v1/external/courier/assign/awb", &body).await?;
        Ok(response.response.data)
    }

    /// Generates shipping labels; returns the label URL when available.
    pub async fn generate_label(&self, shipment_ids: &[i64]) -> Result<Option<String>, ServiceError> {
        let body = serde_json::json!({ "shipment_id": shipment_ids });
        let response: Value = self
            .post_json("/v1/external/courier/generate/label", &body)
            .await?;
        Ok(response
            .get("label_url")
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Tracking events for a shipment, addressed by our order id.
    pub async fn track_by_order(&self, order_id: &str) -> Result<Value, ServiceError> {
        self.get_json(
            &format!("/v1/external/courier/track?order_id={}", order_id),
            Some(self.track_timeout),
        )
        .await
    }

    /// Cancels shipments by provider order id.
    pub async fn cancel_shipments(&self, ids: &[i64]) -> Result<(), ServiceError> {
        let body = serde_json::json!({ "ids": ids });
        let _: Value = self.post_json("/v1/external/orders/cancel", &body).await?;
        Ok(())
    }

    /// Registers a return pickup.
    pub async fn create_return(&self, request: &ReturnRequest) -> Result<ShipmentCreated, ServiceError> {
        self.post_json("/v1/external/orders/create/return", request)
            .await
    }

    /// Configured pickup addresses on the provider account.
    pub async fn pickup_locations(&self) -> Result<Value, ServiceError> {
        self.get_json("/v1/external/settings/company/pickup", None).await
    }

    /// Sales channels registered on the provider account.
    pub async fn channels(&self) -> Result<Value, ServiceError> {
        self.get_json("/v1/external/channels", None).await
    }

    /// Pages through the orders registered on the provider account.
    pub async fn list_orders(&self, page: u32, per_page: u32) -> Result<Value, ServiceError> {
        self.get_json(
            &format!("/v1/external/orders?page={}&per_page={}", page, per_page),
            None,
        )
        .await
    }

    /// Full provider-side record for one order.
    pub async fn order_details(&self, provider_order_id: i64) -> Result<Value, ServiceError> {
        self.get_json(&format!("/v1/external/orders/show/{}", provider_order_id), None)
            .await
    }

    /// Account profile and plan details.
    pub async fn account_details(&self) -> Result<Value, ServiceError> {
        self.get_json("/v1/external/account/details", None).await
    }

    /// Manifest document for a shipment.
    pub async fn manifest(&self, shipment_id: i64) -> Result<Value, ServiceError> {
        self.get_json(&format!("/v1/external/manifests/{}", shipment_id), None)
            .await
    }

    /// Cancels a return-to-origin in progress.
    pub async fn cancel_rto(&self, ids: &[i64]) -> Result<Value, ServiceError> {
        let body = serde_json::json!({ "ids": ids });
        self.post_json("/v1/external/orders/rto/cancel", &body).await
    }
}
