//! In-memory backlog store.
//!
//! Same contract as [`PgBacklogStore`](crate::PgBacklogStore) with all state
//! behind one mutex, so a claim is atomic by construction. Used by tests and
//! single-process runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use skillex_core::{
    BacklogStats, BacklogStore, ClaimLease, ClaimStatus, ClaimedDocument, Document, Error,
    ExtractedSkillRecord, Result, SkillRecordStore, WorkClaim,
};

use crate::backlog::worker_label;
use crate::partition::partition_of;

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    claims: HashMap<Uuid, WorkClaim>,
    /// Enqueue order; claims are served oldest first.
    order: Vec<Uuid>,
    records: HashMap<Uuid, Vec<ExtractedSkillRecord>>,
}

impl State {
    /// Claim row still held by `lease`.
    fn leased_mut(&mut self, lease: ClaimLease) -> Option<&mut WorkClaim> {
        self.claims.get_mut(&lease.document_id).filter(|c| {
            c.status == ClaimStatus::Processing && c.attempts == lease.attempt
        })
    }

    fn pending_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.order.iter().filter(move |&id| {
            self.claims
                .get(id)
                .is_some_and(|c| c.status == ClaimStatus::Pending)
                && self.documents.contains_key(id)
        })
    }
}

/// Backlog held in process memory.
#[derive(Default)]
pub struct MemoryBacklogStore {
    state: Mutex<State>,
}

impl MemoryBacklogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `documents`, all pending.
    pub async fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        for document in documents {
            store.add_document(document).await;
        }
        store
    }

    /// Register a document and enqueue it as pending.
    pub async fn add_document(&self, document: Document) {
        let id = document.id;
        let mut state = self.state.lock().await;
        state.documents.insert(id, document);
        if !state.claims.contains_key(&id) {
            state.claims.insert(id, WorkClaim::pending(id));
            state.order.push(id);
        }
    }

    /// Move a claim's timestamp into the past, as if the worker had stalled.
    pub async fn backdate_claim(&self, document_id: Uuid, by: Duration) -> Result<()> {
        let by = chrono::Duration::from_std(by)
            .map_err(|e| Error::InvalidInput(format!("backdate out of range: {}", e)))?;
        let mut state = self.state.lock().await;
        let claim = state
            .claims
            .get_mut(&document_id)
            .ok_or(Error::DocumentNotFound(document_id))?;
        claim.claimed_at = claim.claimed_at.map(|at| at - by);
        Ok(())
    }
}

#[async_trait]
impl BacklogStore for MemoryBacklogStore {
    async fn claim_batch(
        &self,
        worker_id: usize,
        worker_count: usize,
        batch_size: usize,
    ) -> Result<Vec<ClaimedDocument>> {
        let mut state = self.state.lock().await;

        let mut picked: Vec<Uuid> = state
            .pending_ids()
            .filter(|id| partition_of(id, worker_count) == worker_id)
            .take(batch_size)
            .copied()
            .collect();
        if picked.len() < batch_size {
            let remaining = batch_size - picked.len();
            let extra: Vec<Uuid> = state
                .pending_ids()
                .filter(|id| !picked.contains(id))
                .take(remaining)
                .copied()
                .collect();
            picked.extend(extra);
        }

        let now = Utc::now();
        let label = worker_label(worker_id);
        let mut documents = Vec::with_capacity(picked.len());
        for id in picked {
            let Some(claim) = state.claims.get_mut(&id) else {
                continue;
            };
            claim.status = ClaimStatus::Processing;
            claim.attempts += 1;
            claim.claimed_by = Some(label.clone());
            claim.claimed_at = Some(now);
            claim.error_message = None;
            let lease = ClaimLease {
                document_id: id,
                attempt: claim.attempts,
            };
            if let Some(document) = state.documents.get(&id) {
                documents.push(ClaimedDocument {
                    document: document.clone(),
                    lease,
                });
            }
        }
        documents.sort_by_key(|d| d.id());
        Ok(documents)
    }

    async fn mark_completed(
        &self,
        lease: ClaimLease,
        records: &[ExtractedSkillRecord],
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(claim) = state.leased_mut(lease) else {
            return Ok(false);
        };
        claim.status = ClaimStatus::Completed;
        claim.completed_at = Some(Utc::now());
        claim.error_message = None;

        // Upsert on normalized text: a later record replaces an earlier one.
        let mut kept: Vec<ExtractedSkillRecord> = Vec::with_capacity(records.len());
        for record in records {
            let key = record.normalized_text();
            match kept.iter_mut().find(|r| r.normalized_text() == key) {
                Some(existing) => *existing = record.clone(),
                None => kept.push(record.clone()),
            }
        }
        state.records.insert(lease.document_id, kept);
        Ok(true)
    }

    async fn mark_failed(&self, lease: ClaimLease, error: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(claim) = state.leased_mut(lease) else {
            return Ok(false);
        };
        claim.status = ClaimStatus::Failed;
        claim.error_message = Some(error.to_string());
        claim.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn reset_stale(&self, timeout: Duration) -> Result<u64> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| Error::InvalidInput(format!("stale timeout out of range: {}", e)))?;
        let cutoff = Utc::now() - timeout;
        let mut state = self.state.lock().await;
        let mut reset = 0;
        for claim in state.claims.values_mut() {
            let stale = claim.status == ClaimStatus::Processing
                && claim.claimed_at.is_some_and(|at| at <= cutoff);
            if stale {
                claim.status = ClaimStatus::Pending;
                claim.claimed_by = None;
                claim.claimed_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn requeue_failed(&self, max_attempts: i32) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut requeued = 0;
        for claim in state.claims.values_mut() {
            if claim.status == ClaimStatus::Failed && claim.attempts < max_attempts {
                claim.status = ClaimStatus::Pending;
                claim.claimed_by = None;
                claim.claimed_at = None;
                claim.completed_at = None;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn stats(&self) -> Result<BacklogStats> {
        let state = self.state.lock().await;
        let mut stats = BacklogStats::default();
        for claim in state.claims.values() {
            match claim.status {
                ClaimStatus::Pending => stats.pending += 1,
                ClaimStatus::Processing => stats.processing += 1,
                ClaimStatus::Completed => stats.completed += 1,
                ClaimStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }

    /// Ids without a registered document are tracked but never claimed.
    async fn enqueue(&self, document_ids: &[Uuid]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for id in document_ids {
            if !state.claims.contains_key(id) {
                state.claims.insert(*id, WorkClaim::pending(*id));
                state.order.push(*id);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn get_claim(&self, document_id: Uuid) -> Result<Option<WorkClaim>> {
        Ok(self.state.lock().await.claims.get(&document_id).cloned())
    }
}

#[async_trait]
impl SkillRecordStore for MemoryBacklogStore {
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ExtractedSkillRecord>> {
        let state = self.state.lock().await;
        let mut records = state.records.get(&document_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| {
            a.span_start
                .is_none()
                .cmp(&b.span_start.is_none())
                .then(a.span_start.cmp(&b.span_start))
                .then_with(|| a.skill_text.cmp(&b.skill_text))
        });
        Ok(records)
    }
}
