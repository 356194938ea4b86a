//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [logging]
//! log_format = "json"
//!
//! [schedule]
//! base_delay_ms = 1000
//! jitter_ms = 600000
//!
//! [log]
//! path = "log.jsonl"
//!
//! [email]
//! smtp_host = "smtp.gmail.com"
//! from = "me@example.com"
//! to = ["me@example.com"]
//! smtp_user = "me@example.com"
//!
//! [[webhook]]
//! url = "https://hooks.example.com/stock"
//! events = ["available"]
//!
//! [[target]]
//! id = "strain-110-red"
//! alert_label = "TLTF wheels"
//! url = "https://shop.example.com/products/strain-110-red"
//! predicate = { kind = "absent", text = 'id="AddToCart-product-template" disabled="disabled"' }
//! ```
//!
//! Secrets left out of the file are read from `SMTP_USER`, `SMTP_PASSWORD`
//! and `STOCK_WEBHOOK_SECRET`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use stock_core::{
    EmailConfig, MonitorConfig, PredicateSpec, Target, WebhookConfig, MAX_WEBHOOK_RETRIES,
};

const STATUS_NAMES: [&str; 3] = ["available", "not_available", "error"];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub email: Option<EmailConfig>,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,

    #[serde(default)]
    pub target: Vec<TargetDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: None,
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    600_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from("log.jsonl")
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetDef {
    pub id: Option<String>,
    pub url: String,
    pub alert_label: Option<String>,
    #[serde(default)]
    pub predicate: PredicateSpec,
}

impl ScheduleConfig {
    pub fn to_monitor_config(&self) -> MonitorConfig {
        let mut c = MonitorConfig::default()
            .with_base_delay(self.base_delay_ms)
            .with_jitter(self.jitter_ms)
            .with_request_timeout(self.request_timeout_ms);
        if let Some(ref ua) = self.user_agent {
            c = c.with_user_agent(ua.clone());
        }
        c
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets the file leaves unset from the environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ref mut email) = self.email {
            if email.smtp_user.is_none() {
                email.smtp_user = lookup("SMTP_USER");
            }
            if email.smtp_password.is_none() {
                email.smtp_password = lookup("SMTP_PASSWORD");
            }
        }
        if let Some(secret) = lookup("STOCK_WEBHOOK_SECRET") {
            for wh in self.webhook.iter_mut().filter(|wh| wh.secret.is_none()) {
                wh.secret = Some(secret.clone());
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.target.is_empty() {
            return Err("No targets configured".into());
        }

        let mut ids = HashSet::new();
        let mut urls = HashSet::new();
        for (i, t) in self.target.iter().enumerate() {
            let parsed = url::Url::parse(&t.url)
                .map_err(|e| format!("Invalid target URL at index {}: {} ({})", i, t.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("Target URL must use http or https: {}", t.url));
            }
            if !urls.insert(t.url.as_str()) {
                return Err(format!("Duplicate target URL: {}", t.url));
            }
            if !ids.insert(target_id(t, i)) {
                return Err(format!("Duplicate target ID: {}", target_id(t, i)));
            }
            t.predicate
                .compile()
                .map_err(|e| format!("Invalid predicate for target '{}': {}", target_id(t, i), e))?;
        }

        for (i, wh) in self.webhook.iter().enumerate() {
            url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL at index {}: {} ({})", i, wh.url, e))?;
            if let Some(bad) = wh.events.iter().find(|e| !STATUS_NAMES.contains(&e.as_str())) {
                return Err(format!(
                    "Invalid webhook event '{}': must be one of {}",
                    bad,
                    STATUS_NAMES.join(", ")
                ));
            }
            if wh.max_retries > MAX_WEBHOOK_RETRIES {
                return Err(format!(
                    "Webhook max_retries {} exceeds limit of {}: {}",
                    wh.max_retries, MAX_WEBHOOK_RETRIES, wh.url
                ));
            }
        }

        if let Some(ref email) = self.email {
            if email.to.is_empty() {
                return Err("Email configured without recipients".into());
            }
        }

        match self.logging.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }

    pub fn to_targets(&self) -> Result<Vec<Target>, String> {
        self.target
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let id = target_id(t, i);
                let target = Target::from_spec(&id, &t.url, &t.predicate)
                    .map_err(|e| format!("Invalid predicate for target '{}': {}", id, e))?;
                Ok(match t.alert_label {
                    Some(ref label) => target.with_alert_label(label),
                    None => target,
                })
            })
            .collect()
    }
}

fn target_id(def: &TargetDef, index: usize) -> String {
    def.id
        .clone()
        .unwrap_or_else(|| format!("target_{}", index + 1))
}
