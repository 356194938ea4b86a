//! Operator notifications for availability transitions.
//!
//! The [`ChangeNotifier`] change-listener turns each transition into a
//! [`Notification`] and pushes it through an mpsc channel. The
//! [`NotificationDispatcher`] runs as a detached task, reads from that channel
//! and hands every notification to each configured [`Notifier`]. Delivery
//! failures are logged there and never reach the polling loop.

pub mod email;
pub mod webhook;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::monitor::dispatcher::{Listener, ListenerError};
use crate::monitor::status::{PollResult, Status};
use crate::target::Target;

pub use email::{EmailConfig, SmtpNotifier};
pub use webhook::{WebhookConfig, WebhookNotifier, WebhookPayload, MAX_WEBHOOK_RETRIES};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Email build error: {0}")]
    Build(String),
    #[error("Webhook delivery failed: {0}")]
    Webhook(String),
}

/// Subject and body of an operator alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

impl Alert {
    pub fn for_status(target: &Target, status: Status) -> Self {
        let label = target.label();
        match status {
            Status::Available => Self {
                subject: format!("{} is available!!", label),
                body: format!("{} is available! {}", label, target.url),
            },
            Status::Error => Self {
                subject: format!("{} scraper is broken", label),
                body: format!("The scraper is broken. At {}", target.url),
            },
            Status::NotAvailable => Self {
                subject: format!("{} is no longer available", label),
                body: format!(
                    "{} is not available anymore or the scraper is no longer broken. At {}",
                    label, target.url
                ),
            },
        }
    }
}

/// A status transition, ready to be delivered.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub target_id: String,
    pub url: String,
    pub previous: Option<Status>,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub alert: Alert,
}

impl Notification {
    pub fn from_result(result: &PollResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: result.target.id.clone(),
            url: result.target.url.clone(),
            previous: result.previous,
            status: result.status,
            timestamp: result.timestamp,
            alert: Alert::for_status(&result.target, result.status),
        }
    }
}

/// A transport that delivers notifications to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

pub fn notification_channel() -> (
    mpsc::UnboundedSender<Notification>,
    mpsc::UnboundedReceiver<Notification>,
) {
    mpsc::unbounded_channel()
}

/// Change-listener that enqueues a [`Notification`] for every transition.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChangeNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Listener for ChangeNotifier {
    fn name(&self) -> &'static str {
        "change_notifier"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        self.tx
            .send(Notification::from_result(result))
            .map_err(|_| ListenerError::ChannelClosed)
    }
}

/// Background delivery task. Returns when all senders are dropped.
pub struct NotificationDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(rx: mpsc::UnboundedReceiver<Notification>, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { rx, notifiers }
    }

    pub async fn run(mut self) {
        debug!(notifier_count = self.notifiers.len(), "Notification dispatcher started");

        while let Some(notification) = self.rx.recv().await {
            for notifier in &self.notifiers {
                match AssertUnwindSafe(notifier.notify(&notification))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => debug!(
                        notifier = notifier.name(),
                        target_id = %notification.target_id,
                        status = %notification.status,
                        "Notification delivered"
                    ),
                    Ok(Err(e)) => warn!(
                        notifier = notifier.name(),
                        target_id = %notification.target_id,
                        status = %notification.status,
                        error = %e,
                        "Notification delivery failed"
                    ),
                    Err(_) => warn!(
                        notifier = notifier.name(),
                        target_id = %notification.target_id,
                        status = %notification.status,
                        "Notifier panicked"
                    ),
                }
            }
        }

        debug!("Notification dispatcher shutting down");
    }
}
