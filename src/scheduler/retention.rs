//! Retention manager for cleaning up old results.

use crate::db::Store;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically deletes results older than the retention period.
pub struct RetentionManager {
    store: Arc<Store>,
    retention_days: u32,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention background task. Sweeps once immediately, then hourly.
    pub async fn start(&self) {
        if self.retention_days == 0 {
            tracing::info!("RetentionManager: Retention disabled");
            return;
        }

        let (tx, mut rx) = tokio::sync::broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            if stop_guard.is_some() {
                return;
            }
            *stop_guard = Some(tx);
        }

        let store = self.store.clone();
        let days = self.retention_days;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store, days);
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        let mut stop = self.stop.lock().await;
        if let Some(tx) = stop.take() {
            let _ = tx.send(());
        }
    }
}

fn process_retention(store: &Store, days: u32) -> usize {
    match store.cleanup(days) {
        Ok(0) => 0,
        Ok(deleted) => {
            tracing::info!("RetentionManager: Deleted {} results older than {} days", deleted, days);
            deleted
        }
        Err(e) => {
            tracing::error!("RetentionManager: Failed to clean up results: {}", e);
            0
        }
    }
}
