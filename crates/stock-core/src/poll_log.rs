//! Poll-listeners that record every poll: a JSON Lines file and a tracing line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::monitor::dispatcher::{Listener, ListenerError};
use crate::monitor::status::{PollResult, Status};

#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("Failed to write poll log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize poll record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of the poll log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub target_id: String,
}

impl LogRecord {
    pub fn from_result(result: &PollResult) -> Self {
        Self {
            status: result.status,
            timestamp: result.timestamp,
            url: result.target.url.clone(),
            target_id: result.target.id.clone(),
        }
    }
}

/// Append-only JSON Lines log, one record per poll.
#[derive(Debug, Clone)]
pub struct PollLog {
    path: PathBuf,
}

impl PollLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one newline-terminated record, creating the file if absent.
    pub async fn append(&self, record: &LogRecord) -> Result<(), LogWriteError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.sync_data().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> LogWriteError {
        LogWriteError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl Listener for PollLog {
    fn name(&self) -> &'static str {
        "poll_log"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        self.append(&LogRecord::from_result(result)).await?;
        Ok(())
    }
}

/// Emits one structured tracing event per poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollTracer;

#[async_trait]
impl Listener for PollTracer {
    fn name(&self) -> &'static str {
        "poll_tracer"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        info!(
            target_id = %result.target.id,
            url = %result.target.url,
            status = %result.status,
            transition = %result.transition,
            "Polled target"
        );
        Ok(())
    }
}
