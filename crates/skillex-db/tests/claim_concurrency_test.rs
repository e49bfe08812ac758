//! At-most-once claiming under concurrent callers, against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use skillex_core::{BacklogStore, ClaimStatus, ClaimedDocument, Document};
use skillex_db::MemoryBacklogStore;
use uuid::Uuid;

async fn seeded(count: usize) -> Arc<MemoryBacklogStore> {
    let docs = (0..count).map(|i| Document::new(Uuid::new_v4(), format!("posting {}", i)));
    Arc::new(MemoryBacklogStore::with_documents(docs).await)
}

/// N callers × batch size exceeds the backlog: every document is claimed
/// exactly once and nobody gets a duplicate.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_duplicate() {
    let store = seeded(10).await;
    let workers = 4;
    let batch_size = 3;

    let handles = (0..workers).map(|worker_id| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_batch(worker_id, workers, batch_size).await })
    });
    let batches: Vec<Vec<ClaimedDocument>> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("claim failed"))
        .collect();

    let claimed: Vec<Uuid> = batches.iter().flatten().map(|d| d.id()).collect();
    let unique: HashSet<Uuid> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), unique.len(), "a document was claimed twice");
    assert_eq!(claimed.len(), 10.min(workers * batch_size));
    assert!(batches.iter().all(|b| b.len() <= batch_size));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.processing, 10);
    assert_eq!(stats.pending, 0);
}

/// More capacity than work, many rounds: claims keep draining the backlog
/// without overlap until it is empty.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_repeated_claim_rounds_drain_backlog_once() {
    let store = seeded(100).await;
    let workers = 8;

    let handles = (0..workers).map(|worker_id| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = store.claim_batch(worker_id, workers, 4).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                for doc in batch {
                    assert!(store.mark_completed(doc.lease, &[]).await.unwrap());
                    mine.push(doc.id());
                }
                tokio::task::yield_now().await;
            }
            mine
        })
    });

    let claimed: Vec<Uuid> = join_all(handles)
        .await
        .into_iter()
        .flat_map(|joined| joined.expect("task panicked"))
        .collect();
    let unique: HashSet<Uuid> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 100);
    assert_eq!(unique.len(), 100);

    for id in unique {
        let claim = store.get_claim(id).await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Completed);
        assert_eq!(claim.attempts, 1);
    }
}

/// A document reset by the reaper can be claimed again, counting a new attempt.
#[tokio::test]
async fn test_stale_reset_allows_reclaim() {
    let store = seeded(1).await;
    let first = store.claim_batch(0, 1, 1).await.unwrap();
    assert_eq!(first.len(), 1);

    assert_eq!(
        store
            .reset_stale(std::time::Duration::from_secs(0))
            .await
            .unwrap(),
        1
    );
    let second = store.claim_batch(1, 2, 1).await.unwrap();
    assert_eq!(second[0].id(), first[0].id());
    assert_eq!(second[0].lease.attempt, 2);

    let claim = store.get_claim(first[0].id()).await.unwrap().unwrap();
    assert_eq!(claim.attempts, 2);
    assert_eq!(claim.claimed_by.as_deref(), Some("worker-1"));
}

/// A stalled owner reporting after its claim was reset and handed to another
/// worker must not release the document a second time.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_owner_cannot_release_reclaimed_document() {
    let store = seeded(1).await;
    let stalled = store.claim_batch(0, 2, 1).await.unwrap().remove(0);
    store
        .reset_stale(std::time::Duration::ZERO)
        .await
        .unwrap();
    let live = store.claim_batch(1, 2, 1).await.unwrap().remove(0);
    assert_eq!(live.id(), stalled.id());

    let accepted = store.mark_failed(stalled.lease, "worker stalled").await.unwrap();
    assert!(!accepted, "stale lease flipped a live claim");
    store.requeue_failed(10).await.unwrap();

    let contenders = (0..4).map(|worker_id| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.claim_batch(worker_id, 4, 1).await })
    });
    let reclaimed: usize = join_all(contenders)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("claim failed").len())
        .sum();
    assert_eq!(reclaimed, 0, "document handed out while still held");

    let claim = store.get_claim(live.id()).await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Processing);
    assert_eq!(claim.claimed_by.as_deref(), Some("worker-1"));
    assert_eq!(claim.attempts, 2);
}
