//! Scheduler module for running probes and tracking failure streaks.

mod retention;
mod streak;

pub use retention::*;
pub use streak::*;

use crate::config::ScheduleMode;
use crate::db::{CheckResult, Store, UrlTarget};
use crate::notify::Notifier;
use crate::probe::HttpProber;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const SHARED_TIMER_KEY: &str = "*";

/// Scheduler error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("no targets to monitor")]
    NoTargets,
}

/// Shared dependencies of every check.
pub struct CheckContext {
    store: Arc<Store>,
    prober: HttpProber,
    notifier: Notifier,
    tracker: FailureTracker,
}

impl CheckContext {
    /// Probe a target, store the result, then update its streak and alert.
    ///
    /// Storage and notifier failures are logged; the result is always returned.
    pub async fn run_check(&self, target: &UrlTarget) -> CheckResult {
        let result = self.prober.probe(target).await;

        if result.success {
            tracing::debug!(
                "{} is up: HTTP {} in {}ms",
                target.name,
                result.status_code,
                result.response_time_ms
            );
        } else {
            tracing::warn!(
                "{} check failed: {}",
                target.name,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        if let Err(e) = self.store.insert_result(&result) {
            tracing::error!("Failed to store result for {}: {}", target.name, e);
        }

        match self.tracker.record(&target.url, result.success) {
            StreakAlert::Failure { consecutive_failures } => {
                self.notifier
                    .send_failure_alert(target, consecutive_failures, result.error_message.as_deref())
                    .await;
            }
            StreakAlert::Recovery => self.notifier.send_recovery_alert(target).await,
            StreakAlert::None => {}
        }

        result
    }
}

struct Timer {
    stop_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    running: bool,
    target_count: usize,
    timers: HashMap<String, Timer>,
}

/// Owns the probe timers and the failure tracker.
pub struct Monitor {
    ctx: Arc<CheckContext>,
    mode: ScheduleMode,
    shared_interval: Duration,
    registry: Mutex<Registry>,
}

impl Monitor {
    /// Create a monitor. `shared_interval` is only used in [`ScheduleMode::Shared`].
    pub fn new(
        store: Arc<Store>,
        prober: HttpProber,
        notifier: Notifier,
        mode: ScheduleMode,
        shared_interval: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(CheckContext {
                store,
                prober,
                notifier,
                tracker: FailureTracker::new(),
            }),
            mode,
            shared_interval,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.ctx.tracker
    }

    /// Check every target immediately, then keep checking on their intervals.
    pub async fn start(&self, targets: Vec<UrlTarget>) -> Result<(), SchedulerError> {
        let mut registry = self.registry.lock().await;

        if registry.running {
            return Err(SchedulerError::AlreadyRunning);
        }
        if targets.is_empty() {
            return Err(SchedulerError::NoTargets);
        }

        match self.mode {
            ScheduleMode::PerTarget => {
                for target in targets {
                    if registry.timers.contains_key(&target.url) {
                        tracing::warn!("Scheduler: {} is already scheduled, skipping", target.url);
                        continue;
                    }

                    tracing::info!(
                        "Scheduler: Adding target {} every {:?}",
                        target.name,
                        target.interval.max(MIN_INTERVAL)
                    );

                    let (stop_tx, stop_rx) = broadcast::channel(1);
                    let key = target.url.clone();
                    let handle = tokio::spawn(run_target_loop(self.ctx.clone(), target, stop_rx));
                    registry.timers.insert(key, Timer { stop_tx, handle });
                }
                registry.target_count = registry.timers.len();
            }
            ScheduleMode::Shared => {
                tracing::info!(
                    "Scheduler: Checking {} targets every {:?}",
                    targets.len(),
                    self.shared_interval.max(MIN_INTERVAL)
                );

                registry.target_count = targets.len();
                let (stop_tx, stop_rx) = broadcast::channel(1);
                let handle = tokio::spawn(run_shared_loop(
                    self.ctx.clone(),
                    Arc::new(targets),
                    self.shared_interval,
                    stop_rx,
                ));
                registry
                    .timers
                    .insert(SHARED_TIMER_KEY.to_string(), Timer { stop_tx, handle });
            }
        }

        registry.running = true;
        Ok(())
    }

    /// Cancel all timers. In-flight checks finish and are stored.
    ///
    /// Returns the number of timers cancelled; calling it when stopped is a no-op.
    pub async fn stop(&self) -> usize {
        let mut registry = self.registry.lock().await;
        if !registry.running {
            return 0;
        }

        let count = registry.timers.len();
        for (key, timer) in registry.timers.drain() {
            let _ = timer.stop_tx.send(());
            if let Err(e) = timer.handle.await {
                tracing::error!("Scheduler: Timer for {} ended abnormally: {}", key, e);
            }
        }

        registry.running = false;
        registry.target_count = 0;
        tracing::info!("Scheduler: Stopped {} timers", count);
        count
    }

    pub async fn is_running(&self) -> bool {
        self.registry.lock().await.running
    }

    /// Number of armed timers.
    pub async fn timer_count(&self) -> usize {
        self.registry.lock().await.timers.len()
    }

    /// Number of targets being monitored.
    pub async fn target_count(&self) -> usize {
        self.registry.lock().await.target_count
    }

    /// Check all targets once in parallel and wait for every result.
    pub async fn run_cycle(&self, targets: &[UrlTarget]) -> Vec<CheckResult> {
        run_cycle(&self.ctx, targets).await
    }
}

/// Run the timer loop for a single target.
async fn run_target_loop(ctx: Arc<CheckContext>, target: UrlTarget, mut stop_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(target.interval.max(MIN_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                let ctx = ctx.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    jitter().await;
                    ctx.run_check(&target).await;
                });
            }
        }
    }

    tracing::debug!("Scheduler: Timer for {} stopped", target.name);
}

/// Run one timer that checks every target per tick.
async fn run_shared_loop(
    ctx: Arc<CheckContext>,
    targets: Arc<Vec<UrlTarget>>,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period.max(MIN_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                run_cycle(&ctx, &targets).await;
            }
        }
    }

    tracing::debug!("Scheduler: Shared timer stopped");
}

async fn run_cycle(ctx: &Arc<CheckContext>, targets: &[UrlTarget]) -> Vec<CheckResult> {
    let mut set = JoinSet::new();
    for target in targets {
        let ctx = ctx.clone();
        let target = target.clone();
        set.spawn(async move { ctx.run_check(&target).await });
    }

    let mut results = Vec::with_capacity(targets.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("Check task failed: {}", e),
        }
    }

    let up = results.iter().filter(|r| r.success).count();
    tracing::info!("Monitoring cycle complete: {}/{} targets up", up, targets.len());
    results
}

/// Random delay of up to 100ms to avoid a thundering herd.
async fn jitter() {
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;
}
