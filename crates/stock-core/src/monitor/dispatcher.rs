//! Listener registration and per-poll dispatch.
//!
//! Change-listeners run only when a poll produced a genuine transition;
//! poll-listeners run on every poll. Each listener is awaited in turn and
//! isolated from the others: an error or a panic is logged and dispatch
//! moves on to the next listener.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::warn;

use super::status::PollResult;
use crate::poll_log::LogWriteError;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    LogWrite(#[from] LogWriteError),
    #[error("Notification channel closed")]
    ChannelClosed,
    #[error("{0}")]
    Failed(String),
}

/// Callback invoked by the [`Dispatcher`] with the result of a poll.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &'static str;

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub change_invoked: usize,
    pub poll_invoked: usize,
    pub failures: usize,
}

/// Ordered collections of change- and poll-listeners.
#[derive(Default, Clone)]
pub struct Dispatcher {
    change_listeners: Vec<Arc<dyn Listener>>,
    poll_listeners: Vec<Arc<dyn Listener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_change_listener(&mut self, listener: Arc<dyn Listener>) {
        self.change_listeners.push(listener);
    }

    pub fn add_poll_listener(&mut self, listener: Arc<dyn Listener>) {
        self.poll_listeners.push(listener);
    }

    pub fn with_change_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.add_change_listener(listener);
        self
    }

    pub fn with_poll_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.add_poll_listener(listener);
        self
    }

    pub fn change_listener_count(&self) -> usize {
        self.change_listeners.len()
    }

    pub fn poll_listener_count(&self) -> usize {
        self.poll_listeners.len()
    }

    pub async fn dispatch(&self, result: &PollResult) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if result.transition.is_change() {
            for listener in &self.change_listeners {
                summary.change_invoked += 1;
                if !invoke(listener.as_ref(), result).await {
                    summary.failures += 1;
                }
            }
        }

        for listener in &self.poll_listeners {
            summary.poll_invoked += 1;
            if !invoke(listener.as_ref(), result).await {
                summary.failures += 1;
            }
        }

        summary
    }
}

async fn invoke(listener: &dyn Listener, result: &PollResult) -> bool {
    match AssertUnwindSafe(listener.on_poll(result)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(
                listener = listener.name(),
                target_id = %result.target.id,
                error = %e,
                "Listener failed"
            );
            false
        }
        Err(_) => {
            warn!(
                listener = listener.name(),
                target_id = %result.target.id,
                "Listener panicked"
            );
            false
        }
    }
}
