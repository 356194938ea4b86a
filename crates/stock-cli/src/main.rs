mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use stock_core::{
    notification_channel, ChangeNotifier, Dispatcher, HttpFetcher, Monitor, NotificationDispatcher,
    Notifier, PollLog, PollTracer, SmtpNotifier, Status, WebhookNotifier,
};

use crate::config::AppConfig;

/// Product availability monitor: poll shop pages, alert on restock.
#[derive(Parser)]
#[command(name = "stock-monitor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll all targets until interrupted, logging every poll and alerting on changes.
    Run {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Poll log path. Overrides config file.
        #[arg(long)]
        log_path: Option<PathBuf>,
    },
    /// Poll every target once and print the result (no alerts, no log).
    Check {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Print statuses as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, log_path } => run_monitor(config, log_path).await,
        Commands::Check { config, json } => run_check(config, json).await,
    }
}

fn load_config(path: &Path, default_filter: &str) -> AppConfig {
    match AppConfig::load(path) {
        Ok(c) => {
            init_tracing(&c.logging.log_format, default_filter);
            tracing::info!(path = %path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty", default_filter);
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn build_monitor(app_config: &AppConfig, dispatcher: Dispatcher) -> Monitor {
    let config = app_config.schedule.to_monitor_config();
    let targets = app_config.to_targets().unwrap_or_else(|e| {
        tracing::error!("{}", e);
        std::process::exit(1);
    });
    let fetcher = HttpFetcher::from_config(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create fetcher");
        std::process::exit(1);
    });
    Monitor::new(targets, config, Arc::new(fetcher), dispatcher)
}

fn build_notifiers(app_config: &AppConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(ref email) = app_config.email {
        match SmtpNotifier::new(email) {
            Ok(n) => notifiers.push(Arc::new(n)),
            Err(e) => {
                tracing::error!(smtp_host = %email.smtp_host, error = %e, "Failed to set up email");
                std::process::exit(1);
            }
        }
    }

    if !app_config.webhook.is_empty() {
        let client = HttpFetcher::build_client(
            Duration::from_secs(10),
            &app_config.schedule.to_monitor_config().user_agent,
        )
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to create webhook client");
            std::process::exit(1);
        });
        for wh in &app_config.webhook {
            notifiers.push(Arc::new(WebhookNotifier::new(wh.clone(), client.clone())));
        }
    }

    notifiers
}

async fn run_monitor(config_path: PathBuf, log_path_override: Option<PathBuf>) {
    let app_config = load_config(&config_path, "info");
    let log_path = log_path_override.unwrap_or_else(|| app_config.log.path.clone());

    let notifiers = build_notifiers(&app_config);
    if notifiers.is_empty() {
        tracing::warn!("No email or webhook configured, changes will only be logged");
    }

    let (notification_tx, notification_rx) = notification_channel();
    let notify_handle = tokio::spawn(NotificationDispatcher::new(notification_rx, notifiers).run());

    let dispatcher = Dispatcher::new()
        .with_change_listener(Arc::new(ChangeNotifier::new(notification_tx)))
        .with_poll_listener(Arc::new(PollLog::new(&log_path)))
        .with_poll_listener(Arc::new(PollTracer));

    let monitor = build_monitor(&app_config, dispatcher);

    println!(
        "{} {}",
        style("stock-monitor").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("targets:").dim(), monitor.targets().len());
    println!("  {} {}", style("log:    ").dim(), log_path.display());
    println!(
        "  {} {}ms + up to {}ms",
        style("delay:  ").dim(),
        monitor.config().base_delay.as_millis(),
        monitor.config().jitter.as_millis()
    );
    println!();
    println!("{}", style("Press Ctrl+C to stop").dim());
    println!();

    monitor.run(shutdown_signal()).await;

    // Dropping the monitor drops the last notification sender.
    drop(monitor);
    match tokio::time::timeout(Duration::from_secs(5), notify_handle).await {
        Ok(Ok(())) => tracing::info!("Notification dispatcher shut down"),
        Ok(Err(e)) => tracing::error!(error = %e, "Notification dispatcher task failed"),
        Err(_) => tracing::warn!("Notification dispatcher did not drain in time, pending alerts dropped"),
    }

    tracing::info!("Shutdown complete");
}

async fn run_check(config_path: PathBuf, json: bool) {
    let app_config = load_config(&config_path, "warn");
    let monitor = build_monitor(&app_config, Dispatcher::new());

    let bar = ProgressBar::new(monitor.targets().len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    for target in monitor.targets() {
        bar.set_message(target.url.clone());
        monitor.poll_target(target).await;
        bar.inc(1);
    }
    bar.finish_and_clear();

    let statuses = monitor.statuses().await;

    if json {
        match serde_json::to_string_pretty(&statuses) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize statuses");
                std::process::exit(1);
            }
        }
        return;
    }

    for s in &statuses {
        let label = format!("{:<14}", s.status.map(|st| st.as_str()).unwrap_or("unknown"));
        let colored = match s.status {
            Some(Status::Available) => style(label).green().bold(),
            Some(Status::NotAvailable) => style(label).yellow(),
            Some(Status::Error) | None => style(label).red().bold(),
        };
        println!("  {} {:<20} {}", colored, s.target_id, style(&s.url).dim());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, stopping monitor...");
}

fn init_tracing(log_format: &str, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
