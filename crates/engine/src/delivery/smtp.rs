//! SMTP transport: relay parameters and the dialer that speaks to a relay.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpSettings;
use crate::entity::mail_config;
use crate::error::TransportError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to dial one relay for one delivery. Resolved per send,
/// so a configuration change applies to the very next email.
#[derive(Debug, Clone)]
pub struct RelayParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// STARTTLS upgrade on a plaintext connection.
    pub use_tls: bool,
    /// Implicit TLS from the first byte.
    pub use_ssl: bool,
    pub from: String,
}

impl From<mail_config::Model> for RelayParams {
    fn from(cfg: mail_config::Model) -> Self {
        Self {
            host: cfg.host,
            port: u16::try_from(cfg.port).unwrap_or(587),
            from: cfg.username.clone(),
            username: cfg.username,
            password: cfg.password,
            use_tls: cfg.use_tls,
            use_ssl: cfg.use_ssl,
        }
    }
}

impl From<SmtpSettings> for RelayParams {
    fn from(s: SmtpSettings) -> Self {
        Self {
            host: s.host,
            port: s.port,
            from: s.from.unwrap_or_else(|| s.username.clone()),
            username: s.username,
            password: s.password,
            use_tls: s.use_tls,
            use_ssl: s.use_ssl,
        }
    }
}

/// Hands a built message to a relay. Implemented over real SMTP in
/// production and by in-memory fakes in tests.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, relay: &RelayParams, message: Message) -> Result<(), TransportError>;
}

/// Real SMTP transport. Builds a fresh connection per delivery with the TLS
/// mode the relay parameters ask for.
pub struct SmtpDialer;

impl SmtpDialer {
    fn mailer(
        relay: &RelayParams,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let creds = Credentials::new(relay.username.clone(), relay.password.clone());

        let builder = if relay.use_ssl {
            let tls = TlsParameters::new(relay.host.clone())
                .map_err(|e| TransportError::Build(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::relay(&relay.host)
                .map_err(|e| TransportError::Connection {
                    host: relay.host.clone(),
                    reason: e.to_string(),
                })?
                .tls(Tls::Wrapper(tls))
        } else if relay.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&relay.host).map_err(|e| {
                TransportError::Connection {
                    host: relay.host.clone(),
                    reason: e.to_string(),
                }
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&relay.host)
        };

        Ok(builder
            .port(relay.port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpDialer {
    async fn deliver(&self, relay: &RelayParams, message: Message) -> Result<(), TransportError> {
        let mailer = Self::mailer(relay)?;
        mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
