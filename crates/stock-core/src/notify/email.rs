//! Email delivery via SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Notification, Notifier, NotifyError};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from: String,
    /// Recipients of every alert.
    pub to: Vec<String>,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default, skip_serializing)]
    pub smtp_password: Option<String>,
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

/// Sends alerts as plain-text email to every configured recipient.
pub struct SmtpNotifier {
    from: String,
    to: Vec<String>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from: config.from.clone(),
            to: config.to.clone(),
            mailer: builder.build(),
        })
    }

    /// Send one message to one recipient.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = build_message(&self.from, to, subject, body)?;
        self.mailer.send(email).await?;
        info!(to, subject, "Alert email sent");
        Ok(())
    }
}

fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
    Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| NotifyError::Build(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    /// Attempts every recipient; returns the last failure, if any.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut last_error = None;
        for to in &self.to {
            if let Err(e) = self
                .send(to, &notification.alert.subject, &notification.alert.body)
                .await
            {
                warn!(to = %to, error = %e, "Alert email failed");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}
