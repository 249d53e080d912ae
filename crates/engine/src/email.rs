use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// SMTP connection settings, threaded in at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Use implicit TLS. When false the connection is plaintext, as for a
    /// local relay.
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address used when a step does not name one.
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            secure: false,
            username: None,
            password: None,
            from: "no-reply@opsflow.local".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// SMTP-backed mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Email(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(parse_mailbox(&message.from)?)
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| Error::Email(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| Error::Email(e.to_string()))?;
        debug!(to = %message.to, "email sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| Error::Email(format!("invalid address {address}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_transport_from_config() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 2525,
            secure: false,
            username: Some("mailer".to_string()),
            password: Some("secret".to_string()),
            from: "workflows@example.com".to_string(),
        };
        assert!(SmtpMailer::new(&config).is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_mailbox("not an address").is_err());
        assert!(parse_mailbox("ops@example.com").is_ok());
    }
}
