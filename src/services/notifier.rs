//! Outgoing mail
//!
//! A [`Notifier`] delivers one plain-text [`Mail`]. Which one runs is decided
//! at startup: SMTP when it is enabled in config, otherwise the mail is only
//! written to the log.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::SmtpConfig;

/// A plain-text message to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Where replies go, when not the sender
    pub reply_to: Option<String>,
}

/// Mail delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Pick the notifier for this configuration
pub fn create_notifier(config: &SmtpConfig) -> Result<DynNotifier> {
    if config.enabled {
        Ok(Arc::new(SmtpNotifier::new(config)?))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

/// Sends mail through an SMTP relay
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, mail: Mail) -> Result<()> {
        let mut message = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(mail.to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN);

        if let Some(reply_to) = mail.reply_to {
            message = message.reply_to(
                reply_to
                    .parse()
                    .map_err(|e| anyhow!("Invalid reply-to address: {}", e))?,
            );
        }

        let message = message
            .body(mail.body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        Ok(())
    }
}

/// Writes mail to the log instead of sending it
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, mail: Mail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail (not sent, SMTP disabled):\n{}", mail.body);
        Ok(())
    }
}

/// Keeps every mail in memory
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Mail>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mails delivered so far, oldest first
    pub async fn sent(&self) -> Vec<Mail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, mail: Mail) -> Result<()> {
        self.sent.lock().await.push(mail);
        Ok(())
    }
}
