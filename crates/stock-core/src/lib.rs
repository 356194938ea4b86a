#![forbid(unsafe_code)]

pub mod config;
pub mod fetch;
pub mod monitor;
pub mod notify;
pub mod poll_log;
pub mod target;

pub use config::MonitorConfig;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use monitor::{
    evaluate, DispatchSummary, Dispatcher, Listener, ListenerError, Monitor, Observation,
    PollResult, StateTracker, Status, TargetStatus, TransitionKind,
};
pub use notify::{
    notification_channel, Alert, ChangeNotifier, EmailConfig, Notification,
    NotificationDispatcher, Notifier, NotifyError, SmtpNotifier, WebhookConfig, WebhookNotifier,
    WebhookPayload, MAX_WEBHOOK_RETRIES,
};
pub use poll_log::{LogRecord, LogWriteError, PollLog, PollTracer};
pub use target::{CompiledPredicate, Predicate, PredicateError, PredicateSpec, Target};
