use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::EmailConfig;
use crate::errors::ServiceError;

/// Which of the two configured transports carried a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// STARTTLS on :587
    Primary,
    /// Implicit TLS on :465
    Secondary,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outcome of a delivery attempt sequence. Returned for every call;
/// delivery failure is data, not an error.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub transport_used: Option<TransportKind>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReport {
    fn failure(attempts: u32, error: String) -> Self {
        Self {
            delivered: false,
            transport_used: None,
            attempts,
            error: Some(error),
        }
    }
}

/// Seam over the SMTP stack so delivery policy can be tested without a
/// mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Liveness check run before every send attempt.
    async fn verify(&self) -> Result<(), ServiceError>;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), ServiceError>;
}

/// SMTP transport backed by lettre.
pub struct SmtpMailTransport {
    kind: TransportKind,
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    fn new(
        kind: TransportKind,
        host: &str,
        user: &str,
        pass: &str,
        sender_name: &str,
    ) -> Result<Self, ServiceError> {
        let creds = Credentials::new(user.to_string(), pass.to_string());
        let builder = match kind {
            TransportKind::Primary => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| {
                    ServiceError::ConfigurationError(format!("smtp starttls setup: {}", e))
                })?
                .port(587),
            TransportKind::Secondary => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| ServiceError::ConfigurationError(format!("smtp tls setup: {}", e)))?
                .port(465),
        };
        let transport = builder.credentials(creds).build();

        let sender = format!("{} <{}>", sender_name, user)
            .parse::<Mailbox>()
            .map_err(|e| {
                ServiceError::ConfigurationError(format!("invalid sender address: {}", e))
            })?;

        Ok(Self {
            kind,
            sender,
            transport,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn verify(&self) -> Result<(), ServiceError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ServiceError::NetworkError(
                "smtp server rejected connection test".into(),
            )),
            Err(e) => Err(ServiceError::NetworkError(format!(
                "smtp connection test failed: {}",
                e
            ))),
        }
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), ServiceError> {
        let to = email.to.parse::<Mailbox>().map_err(|e| {
            ServiceError::ValidationError(format!("invalid recipient address: {}", e))
        })?;

        let message = Message::builder()
            .from(self.sender.clone())
            .reply_to(self.sender.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| ServiceError::InternalError(format!("message build failed: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| ServiceError::NetworkError(format!("smtp send failed: {}", e)))
    }
}

/// Transactional email delivery with a primary/secondary transport pair.
/// `send` exhausts the primary before falling back, retrying each with
/// exponential backoff, and always returns a report instead of an error.
pub struct EmailService {
    transports: Option<Vec<Arc<dyn MailTransport>>>,
    max_attempts: u32,
    base_delay: Duration,
    log_failed_content: bool,
}

impl EmailService {
    pub fn from_config(config: &EmailConfig, development: bool) -> Self {
        let transports = match (
            config.user.as_deref().filter(|s| !s.is_empty()),
            config.pass.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(user), Some(pass)) => {
                let primary = SmtpMailTransport::new(
                    TransportKind::Primary,
                    &config.smtp_host,
                    user,
                    pass,
                    &config.sender_name,
                );
                let secondary = SmtpMailTransport::new(
                    TransportKind::Secondary,
                    &config.smtp_host,
                    user,
                    pass,
                    &config.sender_name,
                );
                match (primary, secondary) {
                    (Ok(p), Ok(s)) => Some(vec![
                        Arc::new(p) as Arc<dyn MailTransport>,
                        Arc::new(s) as Arc<dyn MailTransport>,
                    ]),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(target: "email", error = %e, "smtp transport setup failed; email disabled");
                        None
                    }
                }
            }
            _ => {
                warn!(target: "email", "smtp credentials not set; email disabled");
                None
            }
        };

        Self {
            transports,
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            log_failed_content: development,
        }
    }

    /// Constructor with explicit transports, used by tests and by callers
    /// providing their own transport implementations.
    pub fn with_transports(
        transports: Vec<Arc<dyn MailTransport>>,
        max_attempts: u32,
        base_delay: Duration,
        log_failed_content: bool,
    ) -> Self {
        Self {
            transports: Some(transports),
            max_attempts: max_attempts.max(1),
            base_delay,
            log_failed_content,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transports.is_some()
    }

    /// Delivers one message. Never returns an error: the report carries
    /// the outcome, and the caller decides whether it matters.
    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    pub async fn send(&self, email: &OutgoingEmail) -> DeliveryReport {
        let transports = match &self.transports {
            Some(t) => t,
            None => {
                // Misconfiguration is not transient: no attempts, fail fast.
                return DeliveryReport::failure(
                    0,
                    "email service is not configured (missing credentials)".into(),
                );
            }
        };

        let mut attempts = 0;
        let mut last_error = String::new();

        for transport in transports {
            for attempt in 1..=self.max_attempts {
                if attempt > 1 {
                    let delay = self.base_delay * 2u32.pow(attempt - 2);
                    tokio::time::sleep(delay).await;
                }
                attempts += 1;

                let result = match transport.verify().await {
                    Ok(()) => transport.send(email).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(()) => {
                        info!(
                            target: "email",
                            transport = ?transport.kind(),
                            attempts,
                            "email delivered"
                        );
                        return DeliveryReport {
                            delivered: true,
                            transport_used: Some(transport.kind()),
                            attempts,
                            error: None,
                        };
                    }
                    Err(e @ ServiceError::ConfigurationError(_))
                    | Err(e @ ServiceError::ValidationError(_)) => {
                        // Not transient; retrying cannot help.
                        warn!(target: "email", error = %e, "email aborted without retry");
                        self.log_undelivered(email);
                        return DeliveryReport::failure(attempts, e.to_string());
                    }
                    Err(e) => {
                        warn!(
                            target: "email",
                            transport = ?transport.kind(),
                            attempt,
                            error = %e,
                            "email attempt failed"
                        );
                        last_error = e.to_string();
                    }
                }
            }
        }

        self.log_undelivered(email);
        DeliveryReport::failure(attempts, last_error)
    }

    fn log_undelivered(&self, email: &OutgoingEmail) {
        if self.log_failed_content {
            warn!(
                target: "email",
                to = %email.to,
                subject = %email.subject,
                body = %email.html,
                "undelivered email content"
            );
        }
    }
}
