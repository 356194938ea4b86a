use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a monitor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Fixed part of the pause between sweeps (default: 1s).
    pub base_delay: Duration,
    /// Upper bound of the uniformly random extra pause (default: 10min).
    pub jitter: Duration,
    /// HTTP request timeout for page fetches.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            jitter: Duration::from_millis(600_000),
            request_timeout: Duration::from_secs(10),
            user_agent: format!("stock-monitor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl MonitorConfig {
    pub fn with_base_delay(mut self, ms: u64) -> Self {
        self.base_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_jitter(mut self, ms: u64) -> Self {
        self.jitter = Duration::from_millis(ms);
        self
    }

    pub fn with_request_timeout(mut self, ms: u64) -> Self {
        self.request_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
