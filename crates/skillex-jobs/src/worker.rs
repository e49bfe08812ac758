//! Backlog workers: claim a batch, run the pipeline over each document,
//! persist or fail it, repeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use skillex_core::defaults::EVENT_BUS_CAPACITY;
use skillex_core::{
    BacklogStore, BatchSummary, ClaimLease, ClaimedDocument, Error, Result, WorkerConfig,
};

use crate::pipeline::{DocumentOutcome, ExtractionPipeline};
use crate::retry::RetryPolicy;

/// Event emitted by an extraction worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    WorkerStarted { worker_id: usize },
    BatchClaimed { worker_id: usize, count: usize },
    DocumentCompleted {
        worker_id: usize,
        document_id: Uuid,
        skills: usize,
    },
    DocumentFailed {
        worker_id: usize,
        document_id: Uuid,
        error: String,
    },
    BatchFinished {
        worker_id: usize,
        summary: BatchSummary,
    },
    WorkerStopped { worker_id: usize },
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    worker_id: usize,
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Signal the worker to stop after its current batch.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("worker {} task failed: {}", self.worker_id, e)))
    }
}

/// Processes documents claimed from one backlog partition.
pub struct ExtractionWorker {
    worker_id: usize,
    backlog: Arc<dyn BacklogStore>,
    pipeline: Arc<ExtractionPipeline>,
    config: WorkerConfig,
    retry: RetryPolicy,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl ExtractionWorker {
    pub fn new(
        worker_id: usize,
        backlog: Arc<dyn BacklogStore>,
        pipeline: Arc<ExtractionPipeline>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            worker_id,
            backlog,
            pipeline,
            config,
            retry: RetryPolicy::default(),
            event_tx,
        }
    }

    /// Backoff policy for failed claims.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Claim, retrying with backoff. The last error is returned once the
    /// policy is exhausted.
    async fn claim_with_retry(&self) -> Result<Vec<ClaimedDocument>> {
        let mut attempt = 1;
        loop {
            match self
                .backlog
                .claim_batch(self.worker_id, self.config.worker_count, self.config.batch_size)
                .await
            {
                Ok(batch) => return Ok(batch),
                Err(e) if attempt >= self.retry.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.retry.next_delay(attempt);
                    warn!(
                        worker_id = self.worker_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Claim failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Claim one batch and process it sequentially.
    ///
    /// Document failures are recorded in the backlog and counted; only a claim
    /// that keeps failing is returned as an error.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "worker", worker_id = self.worker_id))]
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        let start = Instant::now();
        let batch = self.claim_with_retry().await?;
        let mut summary = BatchSummary {
            claimed: batch.len(),
            ..BatchSummary::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        debug!(batch_size = batch.len(), "Claimed batch");
        let _ = self.event_tx.send(WorkerEvent::BatchClaimed {
            worker_id: self.worker_id,
            count: batch.len(),
        });

        for claimed in &batch {
            self.process_document(claimed, &mut summary).await;
        }

        info!(
            claimed = summary.claimed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skills_persisted = summary.skills_persisted,
            matched = summary.matched,
            emergent = summary.emergent,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );
        let _ = self.event_tx.send(WorkerEvent::BatchFinished {
            worker_id: self.worker_id,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Run the pipeline on its own task so the bound holds even while the
    /// matcher is busy on another runtime thread; the task is aborted once the
    /// bound passes.
    async fn extract_with_timeout(
        &self,
        claimed: &ClaimedDocument,
    ) -> Result<DocumentOutcome> {
        let limit = Duration::from_secs(self.config.document_timeout_secs);
        let pipeline = Arc::clone(&self.pipeline);
        let document = claimed.document.clone();
        let task = tokio::spawn(
            async move { pipeline.process(&document).await }.instrument(tracing::Span::current()),
        );
        let abort = task.abort_handle();

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Internal(format!("extraction task failed: {}", e))),
            Err(_) => {
                abort.abort();
                Err(Error::Timeout(self.config.document_timeout_secs))
            }
        }
    }

    async fn process_document(&self, claimed: &ClaimedDocument, summary: &mut BatchSummary) {
        let start = Instant::now();
        let document_id = claimed.id();

        let outcome = match self.extract_with_timeout(claimed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_document(claimed.lease, &e.to_string(), summary).await;
                return;
            }
        };

        match self
            .backlog
            .mark_completed(claimed.lease, &outcome.records)
            .await
        {
            Ok(true) => {
                summary.succeeded += 1;
                summary.skills_persisted += outcome.records.len();
                summary.matched += outcome.matched();
                summary.emergent += outcome.emergent();
                debug!(
                    document_id = %document_id,
                    result_count = outcome.records.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document completed"
                );
                let _ = self.event_tx.send(WorkerEvent::DocumentCompleted {
                    worker_id: self.worker_id,
                    document_id,
                    skills: outcome.records.len(),
                });
            }
            Ok(false) => {
                // The claim was reset underneath us; another worker may own it now.
                summary.failed += 1;
                warn!(
                    document_id = %document_id,
                    attempt = claimed.lease.attempt,
                    "Lost claim before results were persisted"
                );
            }
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Failed to persist results");
                self.fail_document(claimed.lease, &e.to_string(), summary).await;
            }
        }
    }

    async fn fail_document(&self, lease: ClaimLease, message: &str, summary: &mut BatchSummary) {
        let document_id = lease.document_id;
        summary.failed += 1;
        warn!(document_id = %document_id, error = %message, "Document failed");
        match self.backlog.mark_failed(lease, message).await {
            Ok(true) => {}
            Ok(false) => warn!(
                document_id = %document_id,
                attempt = lease.attempt,
                "Claim no longer held, failure not recorded"
            ),
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Failed to mark document as failed")
            }
        }
        let _ = self.event_tx.send(WorkerEvent::DocumentFailed {
            worker_id: self.worker_id,
            document_id,
            error: message.to_string(),
        });
    }

    /// Start the worker loop and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let worker_id = self.worker_id;

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            worker_id,
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Claim batches until shut down. Sleeps only when nothing was claimed.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker", worker_id = self.worker_id))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "Extraction worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted {
            worker_id: self.worker_id,
        });

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Extraction worker received shutdown signal");
                break;
            }

            let idle = match self.run_batch().await {
                Ok(summary) => summary.is_empty(),
                Err(e) => {
                    error!(error = %e, "Claim failed after retries");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Extraction worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped {
            worker_id: self.worker_id,
        });
        info!("Extraction worker stopped");
    }
}

/// Start one worker per id in [`WorkerConfig::worker_ids`], sharing the
/// backlog and pipeline.
pub fn start_workers(
    backlog: Arc<dyn BacklogStore>,
    pipeline: Arc<ExtractionPipeline>,
    config: &WorkerConfig,
) -> Vec<WorkerHandle> {
    config
        .worker_ids()
        .into_iter()
        .map(|worker_id| {
            ExtractionWorker::new(worker_id, backlog.clone(), pipeline.clone(), config.clone())
                .start()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillex_core::{ExtractionConfig, TaxonomyEntry, TaxonomyStore};
    use skillex_db::MemoryBacklogStore;
    use skillex_extract::EntityExtractor;
    use skillex_match::{TaxonomyMatcher, TaxonomySnapshot};

    fn pipeline() -> Arc<ExtractionPipeline> {
        let store: Arc<dyn TaxonomyStore> = Arc::new(TaxonomySnapshot::new(vec![
            TaxonomyEntry::new("esco:python", "en", "Python"),
        ]));
        let matcher = TaxonomyMatcher::new(store, &ExtractionConfig::default());
        Arc::new(ExtractionPipeline::new(
            Arc::new(matcher),
            EntityExtractor::disabled(),
        ))
    }

    #[tokio::test]
    async fn test_run_batch_on_empty_backlog() {
        let backlog: Arc<dyn BacklogStore> = Arc::new(MemoryBacklogStore::new());
        let worker = ExtractionWorker::new(0, backlog, pipeline(), WorkerConfig::default());
        let summary = worker.run_batch().await.unwrap();
        assert!(summary.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown_emits_lifecycle_events() {
        let backlog: Arc<dyn BacklogStore> = Arc::new(MemoryBacklogStore::new());
        let worker = ExtractionWorker::new(3, backlog, pipeline(), WorkerConfig::default());
        let mut events = worker.events();
        let handle = worker.start();
        assert_eq!(handle.worker_id(), 3);

        assert_eq!(
            events.recv().await.unwrap(),
            WorkerEvent::WorkerStarted { worker_id: 3 }
        );
        handle.shutdown().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            WorkerEvent::WorkerStopped { worker_id: 3 }
        );
        handle.join().await.unwrap();
    }
}
