mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
    #[error("Failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Retrieves the raw markup of a product page.
///
/// One attempt per call; the polling loop is the retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
