//! Owner notification
//!
//! Email owners get a plain-text mail through an authenticated SMTP relay.
//! Chat owners are not notified; the chat integration reports back on its own.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tonewell_core::domain::Owner;
use tracing::{debug, info};

use crate::error::{MissingVar, NotifyError};

/// Subject of the mail sent once a recording is published
pub const READY_SUBJECT: &str = "Recording ready";

/// Tells a job's owner about it
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner: &Owner, message: &str) -> Result<(), NotifyError>;
}

/// SMTP account used for outbound mail
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Login and sender address
    pub account: String,
    pub key: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl EmailConfig {
    /// Reads `EMAIL_ACCOUNT`, `EMAIL_ACCOUNT_KEY`, `SMTP_HOST` and `SMTP_PORT`
    pub fn from_env() -> Result<Self, MissingVar> {
        let account = std::env::var("EMAIL_ACCOUNT").map_err(|_| MissingVar("EMAIL_ACCOUNT"))?;
        let key = std::env::var("EMAIL_ACCOUNT_KEY").map_err(|_| MissingVar("EMAIL_ACCOUNT_KEY"))?;

        let smtp_host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(465);

        Ok(Self {
            account,
            key,
            smtp_host,
            smtp_port,
        })
    }
}

/// Sends plain-text mail over implicit TLS
#[derive(Clone)]
pub struct EmailNotifier {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    /// Prepares the relay; nothing is contacted until the first send
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.account)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.account.clone(),
                config.key.clone(),
            ))
            .build();

        Ok(Self { from, transport })
    }

    /// Mails `body` to `to`
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = self.compose(to, subject, body)?;
        self.transport.send(message).await?;

        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }

    fn compose(&self, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, owner: &Owner, message: &str) -> Result<(), NotifyError> {
        match owner {
            Owner::Email { address } => self.send(address, READY_SUBJECT, message).await,
            Owner::Chat { user_id, .. } => {
                debug!("Not notifying chat user {}", user_id);
                Ok(())
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}
