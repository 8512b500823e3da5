//! Background eviction of idle conversation contexts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::store::ContextStore;

/// Periodically sweeps expired contexts out of the store.
pub struct CleanupScheduler {
    store: Arc<ContextStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl CleanupScheduler {
    /// Create a scheduler sweeping `store` every `interval`.
    pub fn new(store: Arc<ContextStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run one sweep now. Returns the number of evicted contexts.
    pub fn sweep_once(&self) -> usize {
        match self.store.sweep_expired(Utc::now()) {
            Ok(evicted) => {
                tracing::debug!(
                    evicted = evicted.len(),
                    remaining = self.store.stats().active_contexts,
                    "Cleanup sweep finished"
                );
                evicted.len()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cleanup sweep failed");
                0
            }
        }
    }

    /// Sweep every interval until shut down.
    ///
    /// A sweep in progress always completes before the loop exits.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Cleanup scheduler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep_once();
                }
                _ = self.shutdown.notified() => {
                    tracing::info!("Cleanup scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Signal the scheduler to shut down gracefully.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the scheduler on the tokio runtime.
    pub fn spawn(self) -> CleanupHandle {
        let scheduler = Arc::new(self);
        let runner = Arc::clone(&scheduler);
        let task = tokio::spawn(async move { runner.run().await });
        CleanupHandle { scheduler, task }
    }
}

/// Handle to a spawned [`CleanupScheduler`].
pub struct CleanupHandle {
    scheduler: Arc<CleanupScheduler>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Wait for the background task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Cleanup task ended abnormally");
        }
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}
