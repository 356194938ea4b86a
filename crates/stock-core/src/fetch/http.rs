use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{FetchError, Fetcher};
use crate::config::MonitorConfig;

/// reqwest-backed page fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        Ok(Self::with_client(Self::build_client(timeout, user_agent)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, FetchError> {
        Self::new(config.request_timeout, &config.user_agent)
    }

    pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, FetchError> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(url, "Page fetch timed out");
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
            Err(e) => {
                warn!(url, error = %e, "Page fetch network error");
                return Err(FetchError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Page fetch returned error status");
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        debug!(url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
