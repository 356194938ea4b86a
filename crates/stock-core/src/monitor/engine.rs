use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::dispatcher::Dispatcher;
use super::evaluator::evaluate;
use super::status::{PollResult, TargetStatus};
use super::tracker::StateTracker;
use crate::config::MonitorConfig;
use crate::fetch::Fetcher;
use crate::target::Target;

/// Drives sequential sweeps over all targets.
pub struct Monitor {
    id: Uuid,
    config: MonitorConfig,
    targets: Vec<Arc<Target>>,
    fetcher: Arc<dyn Fetcher>,
    tracker: RwLock<StateTracker>,
    dispatcher: Dispatcher,
    sweep_count: AtomicU64,
    last_sweep: RwLock<Option<DateTime<Utc>>>,
}

impl Monitor {
    pub fn new(
        targets: Vec<Target>,
        config: MonitorConfig,
        fetcher: Arc<dyn Fetcher>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            targets: targets.into_iter().map(Arc::new).collect(),
            fetcher,
            tracker: RwLock::new(StateTracker::new()),
            dispatcher,
            sweep_count: AtomicU64::new(0),
            last_sweep: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweep_count.load(Ordering::Relaxed)
    }

    pub async fn last_sweep(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.read().await
    }

    /// Current observation of every target, in configuration order.
    pub async fn statuses(&self) -> Vec<TargetStatus> {
        let tracker = self.tracker.read().await;
        self.targets
            .iter()
            .map(|t| TargetStatus {
                target_id: t.id.clone(),
                url: t.url.clone(),
                status: tracker.observation(&t.url).status(),
                last_polled: tracker.last_polled(&t.url),
            })
            .collect()
    }

    /// Fetch, evaluate, classify and dispatch one target.
    pub async fn poll_target(&self, target: &Arc<Target>) -> PollResult {
        let outcome = self.fetcher.fetch(&target.url).await;
        let status = evaluate(target, &outcome);
        let timestamp = Utc::now();

        // The write lock is released before dispatch so listeners can read
        // the updated status.
        let (previous, transition) = {
            let mut tracker = self.tracker.write().await;
            let previous = tracker.observation(&target.url).status();
            (previous, tracker.record_at(target, status, timestamp))
        };

        let result = PollResult {
            target: Arc::clone(target),
            previous,
            status,
            transition,
            timestamp,
        };

        let summary = self.dispatcher.dispatch(&result).await;
        debug!(
            target_id = %target.id,
            status = %status,
            transition = %transition,
            change_listeners = summary.change_invoked,
            poll_listeners = summary.poll_invoked,
            listener_failures = summary.failures,
            "Poll dispatched"
        );

        result
    }

    /// Poll every target once, sequentially.
    pub async fn sweep(&self) -> Vec<PollResult> {
        self.sweep_until(std::future::pending::<()>()).await
    }

    /// Like [`sweep`](Self::sweep), but stops before the next target once
    /// `shutdown` has resolved.
    async fn sweep_until<F>(&self, shutdown: F) -> Vec<PollResult>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        *self.last_sweep.write().await = Some(Utc::now());

        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if (&mut shutdown).now_or_never().is_some() {
                break;
            }
            results.push(self.poll_target(target).await);
        }
        if results.len() == self.targets.len() {
            self.sweep_count.fetch_add(1, Ordering::Relaxed);
        }
        results
    }

    /// Pause before the next sweep: `base_delay` plus uniform jitter.
    pub fn next_delay(&self) -> Duration {
        jittered_delay(self.config.base_delay, self.config.jitter)
    }

    /// Sweep forever with a jittered pause in between, until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let shutdown = shutdown.shared();
        info!(
            monitor_id = %self.id,
            targets = self.targets.len(),
            "Starting monitor"
        );

        loop {
            let results = self.sweep_until(shutdown.clone()).await;
            if results.len() < self.targets.len() {
                break;
            }

            let delay = self.next_delay();
            debug!(
                sweep = self.sweep_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Sweep complete, sleeping"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.clone() => break,
            }
        }

        info!(monitor_id = %self.id, sweeps = self.sweep_count(), "Monitor stopped");
    }
}

pub fn jittered_delay(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    let extra = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_ms)
    } else {
        0
    };
    base + Duration::from_millis(extra)
}
