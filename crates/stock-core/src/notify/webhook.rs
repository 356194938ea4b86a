//! Webhook delivery: JSON POST with optional HMAC-SHA256 signature.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::{Alert, Notification, Notifier, NotifyError};
use crate::monitor::status::Status;

pub const SIGNATURE_HEADER: &str = "X-Stock-Signature-256";

/// Upper bound accepted for [`WebhookConfig::max_retries`].
pub const MAX_WEBHOOK_RETRIES: u32 = 10;

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The URL to POST payloads to.
    pub url: String,

    /// Which new statuses to deliver (`available`, `not_available`, `error`).
    /// Empty means all.
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_webhook_retries() -> u32 {
    2
}

impl WebhookConfig {
    pub fn accepts(&self, status: Status) -> bool {
        if self.events.is_empty() {
            return true;
        }
        self.events.iter().any(|e| e == status.as_str())
    }
}

/// The JSON envelope POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub target_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Status>,
    pub status: Status,
    pub alert: Alert,
}

impl WebhookPayload {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            version: 1,
            id: notification.id.to_string(),
            timestamp: notification.timestamp,
            notification_type: "status_changed".to_string(),
            target_id: notification.target_id.clone(),
            url: notification.url.clone(),
            previous: notification.previous,
            status: notification.status,
            alert: notification.alert.clone(),
        }
    }
}

pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if !self.config.accepts(notification.status) {
            debug!(url = %self.config.url, status = %notification.status, "Webhook filtered out");
            return Ok(());
        }

        let payload = WebhookPayload::from_notification(notification);
        let body = serde_json::to_vec(&payload).map_err(|e| NotifyError::Webhook(e.to_string()))?;

        deliver(
            &self.client,
            &self.config.url,
            &body,
            self.config.secret.as_deref(),
            Duration::from_millis(self.config.timeout_ms),
            self.config.max_retries,
        )
        .await
        .map_err(NotifyError::Webhook)
    }
}

async fn deliver(
    client: &Client,
    url: &str,
    body: &[u8],
    secret: Option<&str>,
    timeout: Duration,
    max_retries: u32,
) -> Result<(), String> {
    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(retry_backoff(attempt)).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .body(body.to_vec());

        if let Some(secret) = secret {
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(body, secret)));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status();
                last_error = format!("HTTP {} from {}", status, url);
                if status.is_client_error() && status.as_u16() != 429 {
                    return Err(last_error);
                }
            }
            Err(e) => {
                last_error = format!("Request to {} failed: {}", url, e);
            }
        }
    }

    Err(last_error)
}

/// Exponential backoff starting at 500ms before retry `attempt` (1-based).
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))))
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
