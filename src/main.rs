//! urlpulse - URL uptime monitoring.
//!
//! Periodically probes a list of URLs, records every outcome in SQLite,
//! alerts on failure streaks and serves a dashboard. `urlpulse snapshot`
//! runs a single cycle and exports a static report instead.

mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod snapshot;
mod web;

use config::ServerConfig;
use db::Store;
use notify::Notifier;
use probe::HttpProber;
use scheduler::{Monitor, RetentionManager};
use web::Server;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

enum Command {
    Serve,
    Snapshot(Option<PathBuf>),
}

fn parse_command() -> Result<Command, BoxError> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => Ok(Command::Serve),
        Some("snapshot") => Ok(Command::Snapshot(args.next().map(PathBuf::from))),
        Some(other) => Err(format!("unknown command '{}' (expected 'serve' or 'snapshot')", other).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("urlpulse=info".parse()?))
        .init();

    let command = parse_command()?;

    // Load configuration
    let cfg = ServerConfig::load();
    let targets = config::load_targets(Path::new(&cfg.targets_path), cfg.default_interval)?;
    tracing::info!("Loaded {} targets from {}", targets.len(), cfg.targets_path);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized with {} stored results", store.count_results()?);

    let prober = HttpProber::new(cfg.request_timeout, &cfg.user_agent)?;
    let notifier = Notifier::new(cfg.webhook_url.clone());
    if notifier.is_enabled() {
        tracing::info!("Alerts enabled after {} consecutive failures", scheduler::FAILURE_THRESHOLD);
    }
    let monitor = Arc::new(Monitor::new(
        store.clone(),
        prober,
        notifier,
        cfg.schedule_mode,
        cfg.default_interval,
    ));

    match command {
        Command::Snapshot(dir) => {
            let out_dir = dir.unwrap_or_else(|| PathBuf::from(&cfg.snapshot_dir));
            let results = monitor.run_cycle(&targets).await;
            tracing::info!("Checked {} targets", results.len());
            snapshot::write_snapshot(&store, &out_dir)?;
        }
        Command::Serve => {
            monitor.start(targets).await?;

            let retention = RetentionManager::new(store.clone(), cfg.retention_days);
            retention.start().await;

            let server = Server::new(cfg, store, monitor.clone());
            server.start(shutdown_signal()).await?;

            retention.stop().await;
            monitor.stop().await;
            tracing::info!("Shut down cleanly");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
