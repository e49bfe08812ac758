//! Backlog maintenance: crash recovery and bounded retries.
//!
//! The reaper resets claims abandoned in `processing` (a worker died or hung
//! past the stale timeout) and requeues failed documents that still have
//! attempts left.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use skillex_core::{BacklogStore, Error, Result, WorkerConfig};

/// Rows touched by one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperReport {
    pub reset_stale: u64,
    pub requeued: u64,
}

/// Periodic `reset_stale` + `requeue_failed`.
pub struct Reaper {
    backlog: Arc<dyn BacklogStore>,
    stale_timeout: Duration,
    max_attempts: i32,
    interval: Duration,
}

impl Reaper {
    pub fn new(backlog: Arc<dyn BacklogStore>, config: &WorkerConfig) -> Self {
        Self {
            backlog,
            stale_timeout: Duration::from_secs(config.stale_timeout_secs),
            max_attempts: config.max_attempts,
            interval: Duration::from_secs(config.reaper_interval_secs),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One maintenance pass.
    pub async fn run_once(&self) -> Result<ReaperReport> {
        let report = ReaperReport {
            reset_stale: self.backlog.reset_stale(self.stale_timeout).await?,
            requeued: self.backlog.requeue_failed(self.max_attempts).await?,
        };
        debug!(
            subsystem = "jobs",
            component = "reaper",
            reset_stale = report.reset_stale,
            requeued = report.requeued,
            "Reaper pass complete"
        );
        Ok(report)
    }

    /// Run passes every interval until shut down.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            info!(
                subsystem = "jobs",
                component = "reaper",
                interval_secs = self.interval.as_secs(),
                stale_timeout_secs = self.stale_timeout.as_secs(),
                max_attempts = self.max_attempts,
                "Reaper started"
            );
            loop {
                if let Err(e) = self.run_once().await {
                    error!(subsystem = "jobs", component = "reaper", error = %e, "Reaper pass failed");
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = sleep(self.interval) => {}
                }
            }
            info!(subsystem = "jobs", component = "reaper", "Reaper stopped");
        });
        ReaperHandle { shutdown_tx, task }
    }
}

/// Handle for a running reaper.
pub struct ReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("reaper task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillex_core::{ClaimStatus, Document};
    use skillex_db::MemoryBacklogStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_once_resets_and_requeues() {
        let stale = Document::new(Uuid::new_v4(), "a");
        let failed = Document::new(Uuid::new_v4(), "b");
        let store = Arc::new(MemoryBacklogStore::with_documents([stale.clone(), failed.clone()]).await);
        let claimed = store.claim_batch(0, 1, 2).await.unwrap();
        let lease = claimed.iter().find(|c| c.id() == failed.id).unwrap().lease;
        assert!(store.mark_failed(lease, "boom").await.unwrap());
        store
            .backdate_claim(stale.id, Duration::from_secs(7200))
            .await
            .unwrap();

        let reaper = Reaper::new(store.clone(), &WorkerConfig::default());
        let report = reaper.run_once().await.unwrap();
        assert_eq!(report, ReaperReport { reset_stale: 1, requeued: 1 });

        for id in [stale.id, failed.id] {
            let claim = store.get_claim(id).await.unwrap().unwrap();
            assert_eq!(claim.status, ClaimStatus::Pending);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let store: Arc<dyn BacklogStore> = Arc::new(MemoryBacklogStore::new());
        let handle = Reaper::new(store, &WorkerConfig::default())
            .with_interval(Duration::from_millis(10))
            .start();
        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.shutdown().await.unwrap();
    }
}
