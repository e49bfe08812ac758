//! PostgreSQL backlog store and claim protocol.
//!
//! Claiming is a single `UPDATE … FROM (CTE … FOR UPDATE SKIP LOCKED) …
//! RETURNING` statement: concurrent workers skip rows another claimer holds
//! instead of waiting on them, and no row is ever flipped to `processing`
//! by two statements.
//!
//! Each claimed row comes back with its post-increment `attempts`, which
//! becomes the [`ClaimLease`]. Completion and failure reports only apply while
//! the row is still `processing` under that same attempt, so a worker whose
//! claim was reset and handed to someone else cannot overwrite the new
//! claimer's row.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use skillex_core::{
    BacklogStats, BacklogStore, ClaimLease, ClaimStatus, ClaimedDocument, Document, Error,
    ExtractedSkillRecord, Result, WorkClaim,
};

use crate::partition::PARTITION_SQL;
use crate::skills::replace_records;

/// Label stored in `claimed_by` for a worker.
pub fn worker_label(worker_id: usize) -> String {
    format!("worker-{}", worker_id)
}

/// PostgreSQL implementation of [`BacklogStore`].
pub struct PgBacklogStore {
    pool: Pool<Postgres>,
}

impl PgBacklogStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Claim statement. `$1` worker id, `$2` worker count, `$3` batch size,
    /// `$4` claimer label.
    ///
    /// `own` locks pending rows of this worker's partition; `fallback` tops the
    /// batch up from the rest of the backlog when the partition runs short.
    fn claim_sql() -> String {
        format!(
            "WITH own AS (
                 SELECT document_id FROM extraction_backlog
                  WHERE status = 'pending'
                    AND {PARTITION_SQL} % $2 = $1
                  ORDER BY enqueued_at, document_id
                  LIMIT $3
                  FOR UPDATE SKIP LOCKED
             ),
             fallback AS (
                 SELECT document_id FROM extraction_backlog
                  WHERE status = 'pending'
                    AND document_id NOT IN (SELECT document_id FROM own)
                  ORDER BY enqueued_at, document_id
                  LIMIT GREATEST($3 - (SELECT COUNT(*) FROM own), 0)
                  FOR UPDATE SKIP LOCKED
             ),
             picked AS (
                 SELECT document_id FROM own
                 UNION ALL
                 SELECT document_id FROM fallback
             )
             UPDATE extraction_backlog b
                SET status = 'processing',
                    attempts = b.attempts + 1,
                    claimed_by = $4,
                    claimed_at = NOW(),
                    error_message = NULL
               FROM picked p
               JOIN job_postings j ON j.id = p.document_id
              WHERE b.document_id = p.document_id
             RETURNING j.id, j.title, j.description, j.requirements,
                       j.combined_text, j.locale, j.word_count, b.attempts"
        )
    }

    fn parse_claimed_row(row: PgRow) -> ClaimedDocument {
        let id: Uuid = row.get("id");
        ClaimedDocument {
            lease: ClaimLease {
                document_id: id,
                attempt: row.get("attempts"),
            },
            document: Document {
                id,
                title: row.get::<Option<String>, _>("title").unwrap_or_default(),
                description: row.get::<Option<String>, _>("description").unwrap_or_default(),
                requirements: row.get::<Option<String>, _>("requirements").unwrap_or_default(),
                combined_text: row.get("combined_text"),
                locale: row.get("locale"),
                word_count: row.get("word_count"),
            },
        }
    }

    fn parse_claim_row(row: PgRow) -> Result<WorkClaim> {
        let status: String = row.get("status");
        Ok(WorkClaim {
            document_id: row.get("document_id"),
            status: status.parse::<ClaimStatus>()?,
            attempts: row.get("attempts"),
            error_message: row.get("error_message"),
            claimed_by: row.get("claimed_by"),
            claimed_at: row.get("claimed_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl BacklogStore for PgBacklogStore {
    async fn claim_batch(
        &self,
        worker_id: usize,
        worker_count: usize,
        batch_size: usize,
    ) -> Result<Vec<ClaimedDocument>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let rows = sqlx::query(&Self::claim_sql())
            .bind(worker_id as i64)
            .bind(worker_count.max(1) as i64)
            .bind(batch_size as i64)
            .bind(worker_label(worker_id))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Claim(format!("claim statement failed: {}", e)))?;

        let mut documents: Vec<ClaimedDocument> =
            rows.into_iter().map(Self::parse_claimed_row).collect();
        documents.sort_by_key(|d| d.id());

        debug!(
            subsystem = "db",
            component = "backlog",
            op = "claim_batch",
            worker_id,
            batch_size,
            result_count = documents.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Claimed batch"
        );
        Ok(documents)
    }

    async fn mark_completed(
        &self,
        lease: ClaimLease,
        records: &[ExtractedSkillRecord],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let flipped = sqlx::query(
            "UPDATE extraction_backlog
                SET status = 'completed', completed_at = NOW(), error_message = NULL
              WHERE document_id = $1 AND status = 'processing' AND attempts = $2",
        )
        .bind(lease.document_id)
        .bind(lease.attempt)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if flipped == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            warn!(
                subsystem = "db",
                component = "backlog",
                op = "mark_completed",
                document_id = %lease.document_id,
                attempt = lease.attempt,
                "Claim no longer held, results discarded"
            );
            return Ok(false);
        }

        replace_records(&mut *tx, lease.document_id, records).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(true)
    }

    async fn mark_failed(&self, lease: ClaimLease, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_backlog
                SET status = 'failed', error_message = $3, completed_at = NOW()
              WHERE document_id = $1 AND status = 'processing' AND attempts = $2",
        )
        .bind(lease.document_id)
        .bind(lease.attempt)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_stale(&self, timeout: Duration) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE extraction_backlog
                SET status = 'pending', claimed_by = NULL, claimed_at = NULL
              WHERE status = 'processing'
                AND claimed_at < NOW() - ($1::double precision * INTERVAL '1 second')",
        )
        .bind(timeout.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(
                subsystem = "db",
                component = "backlog",
                op = "reset_stale",
                result_count = reset,
                timeout_secs = timeout.as_secs(),
                "Reset stale claims to pending"
            );
        }
        Ok(reset)
    }

    async fn requeue_failed(&self, max_attempts: i32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE extraction_backlog
                SET status = 'pending', claimed_by = NULL, claimed_at = NULL, completed_at = NULL
              WHERE status = 'failed' AND attempts < $1",
        )
        .bind(max_attempts)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            info!(
                subsystem = "db",
                component = "backlog",
                op = "requeue_failed",
                result_count = requeued,
                max_attempts,
                "Requeued failed documents"
            );
        }
        Ok(requeued)
    }

    async fn stats(&self) -> Result<BacklogStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                    COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                    COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                    COUNT(*) AS total
               FROM extraction_backlog",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(BacklogStats {
            pending: row.get("pending"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            total: row.get("total"),
        })
    }

    async fn enqueue(&self, document_ids: &[Uuid]) -> Result<u64> {
        if document_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "INSERT INTO extraction_backlog (document_id, status, attempts, enqueued_at)
             SELECT id, 'pending', 0, NOW() FROM UNNEST($1::uuid[]) AS t(id)
             ON CONFLICT (document_id) DO NOTHING",
        )
        .bind(document_ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn get_claim(&self, document_id: Uuid) -> Result<Option<WorkClaim>> {
        let row = sqlx::query(
            "SELECT document_id, status, attempts, error_message, claimed_by,
                    claimed_at, completed_at
               FROM extraction_backlog
              WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.map(Self::parse_claim_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_label() {
        assert_eq!(worker_label(3), "worker-3");
    }

    #[test]
    fn test_claim_sql_locks_without_waiting() {
        let sql = PgBacklogStore::claim_sql();
        assert_eq!(sql.matches("FOR UPDATE SKIP LOCKED").count(), 2);
        assert!(sql.contains("md5(document_id::text)"));
        assert!(sql.contains("attempts = b.attempts + 1"));
        assert!(sql.contains("j.word_count, b.attempts"));
        assert!(sql.trim_start().starts_with("WITH own AS"));
    }
}
