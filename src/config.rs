use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

/// Credentials and tuning for the hosted payment provider.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct PaymentConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_payment_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_order_timeout_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

/// SMTP credentials shared by the primary and secondary transports.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct EmailConfig {
    pub user: Option<String>,
    pub pass: Option<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    #[serde(default = "default_email_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_email_max_attempts")]
    pub max_attempts: u32,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_sender_name() -> String {
    "Storefront".to_string()
}

fn default_email_base_delay_ms() -> u64 {
    1000
}

fn default_email_max_attempts() -> u32 {
    3
}

/// Logistics provider credentials and endpoints.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ShippingConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_shipping_base_url")]
    pub base_url: String,
    #[serde(default = "default_pickup_location")]
    pub pickup_location: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub track_timeout_secs: u64,
}

fn default_shipping_base_url() -> String {
    "https://apiv2.shiprocket.in".to_string()
}

fn default_pickup_location() -> String {
    "Primary".to_string()
}

/// Webhook endpoint for operational admin notifications.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AdminNotifyConfig {
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// "development" enables verbose failure logging (undelivered email
    /// content is written to the log for inspection).
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Public base URL used in email links.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: String,

    #[validate]
    pub payment: PaymentConfig,

    #[validate]
    pub email: EmailConfig,

    #[validate]
    pub shipping: ShippingConfig,

    #[validate]
    pub admin_notify: AdminNotifyConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_currency() -> String {
    "INR".to_string()
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment != "production"
    }
}

/// Loads configuration from optional `config/{default,<env>}.toml` files
/// layered under `APP_*` environment-variable overrides
/// (e.g. `APP_PAYMENT__KEY_ID`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", run_env.clone())?
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("Configuration validation failed: {}", e)))?;

    Ok(app_config)
}

/// Installs the global tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
