//! Core traits for skillex abstractions.
//!
//! Stores and model backends sit behind these traits so the extraction
//! pipeline runs unchanged against PostgreSQL, in-memory stores, HTTP model
//! servers, or deterministic mocks.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TAXONOMY
// =============================================================================

/// Read-only access to the skill taxonomy.
///
/// Every method returns active entries only, in a deterministic order.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Entries with a label (any locale) equal to `text`, ignoring case.
    async fn lookup_by_label(&self, text: &str) -> Result<Vec<TaxonomyEntry>>;

    /// Entries with a label sharing at least one normalized token with `tokens`.
    async fn lookup_candidates_by_token(&self, tokens: &[String]) -> Result<Vec<TaxonomyEntry>>;

    /// The full set of entries.
    async fn all_entries(&self) -> Result<Vec<TaxonomyEntry>>;
}

// =============================================================================
// BACKLOG
// =============================================================================

/// Shared document backlog with atomic batch claiming.
///
/// Implementations guarantee that no document is held in `processing` by two
/// callers at once, and that concurrent `claim_batch` calls never block on
/// each other's rows.
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// Claim up to `batch_size` pending documents, flipping them to
    /// `processing` and incrementing their attempt count.
    ///
    /// Candidates in this worker's hash partition (`hash(id) % worker_count ==
    /// worker_id`) are preferred; when that partition runs short the rest of
    /// the backlog tops the batch up.
    async fn claim_batch(
        &self,
        worker_id: usize,
        worker_count: usize,
        batch_size: usize,
    ) -> Result<Vec<ClaimedDocument>>;

    /// Persist `records` (replacing earlier ones for the document) and mark the
    /// document completed, atomically. Returns `false` when `lease` no longer
    /// holds the claim: the row left `processing` or was claimed again.
    async fn mark_completed(
        &self,
        lease: ClaimLease,
        records: &[ExtractedSkillRecord],
    ) -> Result<bool>;

    /// Mark the leased document failed with an error message. Returns `false`
    /// when `lease` no longer holds the claim.
    async fn mark_failed(&self, lease: ClaimLease, error: &str) -> Result<bool>;

    /// Reset documents stuck in `processing` longer than `timeout` to `pending`.
    async fn reset_stale(&self, timeout: Duration) -> Result<u64>;

    /// Reset failed documents with fewer than `max_attempts` attempts to `pending`.
    async fn requeue_failed(&self, max_attempts: i32) -> Result<u64>;

    /// Counts by status.
    async fn stats(&self) -> Result<BacklogStats>;

    /// Add documents to the backlog as `pending`. Already-present ids are left alone.
    async fn enqueue(&self, document_ids: &[Uuid]) -> Result<u64>;

    /// Current backlog row for one document.
    async fn get_claim(&self, document_id: Uuid) -> Result<Option<WorkClaim>>;
}

/// Read access to persisted skill records.
#[async_trait]
pub trait SkillRecordStore: Send + Sync {
    /// Records for one document, ordered by span then skill text.
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<ExtractedSkillRecord>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<crate::Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Kind of span a recognizer returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    NamedEntity,
    NounPhrase,
}

/// A span returned by an entity recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    pub text: String,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    pub kind: SpanKind,
    /// Model label ("organization", "product", "skill", ...).
    pub label: String,
    pub score: f32,
}

/// Statistical model producing named entities and noun phrases.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
