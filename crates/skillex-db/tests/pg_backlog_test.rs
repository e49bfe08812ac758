//! PostgreSQL backlog, record and taxonomy store tests.
//!
//! Require a database: `DATABASE_URL=... cargo test -p skillex-db -- --ignored`.
//! Tests share the backlog table, so they serialize on [`LOCK`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use skillex_core::{
    BacklogStore, ClaimLease, ClaimStatus, ExtractedSkillRecord, ExtractionMethod, LocalizedLabel,
    MatchMethod, SkillRecordStore, TaxonomyEntry, TaxonomyStore,
};
use skillex_db::test_fixtures::TestDatabase;
use skillex_db::{PgBacklogStore, PgSkillRepository, PgTaxonomyStore};
use tokio::sync::Mutex;
use uuid::Uuid;

static LOCK: Mutex<()> = Mutex::const_new(());

async fn setup() -> TestDatabase {
    let _ = dotenvy::dotenv();
    TestDatabase::new()
        .await
        .expect("Failed to connect to test database")
}

/// Claim everything pending and return only the leases for ids this test inserted.
async fn claim_ours(
    store: &PgBacklogStore,
    ours: &HashSet<Uuid>,
    batch: usize,
) -> Vec<ClaimLease> {
    claim_ours_as(store, 0, ours, batch).await
}

async fn claim_ours_as(
    store: &PgBacklogStore,
    worker_id: usize,
    ours: &HashSet<Uuid>,
    batch: usize,
) -> Vec<ClaimLease> {
    store
        .claim_batch(worker_id, 1, batch)
        .await
        .expect("claim failed")
        .into_iter()
        .map(|d| d.lease)
        .filter(|lease| ours.contains(&lease.document_id))
        .collect()
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_claim_complete_and_record_round_trip() {
    let _guard = LOCK.lock().await;
    let db = setup().await;
    let backlog = PgBacklogStore::new(db.pool.clone());
    let skills = PgSkillRepository::new(db.pool.clone());

    let id = db
        .insert_posting("Se requiere experiencia en Python y AWS")
        .await
        .unwrap();
    let ours: HashSet<Uuid> = [id].into_iter().collect();
    let leases = claim_ours(&backlog, &ours, 1000).await;
    assert_eq!(leases, vec![ClaimLease { document_id: id, attempt: 1 }]);
    let lease = leases[0];

    let claim = backlog.get_claim(id).await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Processing);
    assert_eq!(claim.attempts, 1);
    assert_eq!(claim.claimed_by.as_deref(), Some("worker-0"));

    let record = ExtractedSkillRecord {
        document_id: id,
        skill_text: "Python".to_string(),
        extraction_method: ExtractionMethod::Pattern,
        final_confidence: 0.86,
        taxonomy_uri: Some("esco:python".to_string()),
        match_method: Some(MatchMethod::Exact),
        skill_type: Some("skill/competence".to_string()),
        span_start: Some(27),
        span_end: Some(33),
    };
    let emergent = ExtractedSkillRecord {
        skill_text: "AWS".to_string(),
        final_confidence: 0.56,
        taxonomy_uri: None,
        match_method: None,
        skill_type: Some("cloud".to_string()),
        span_start: Some(36),
        span_end: Some(39),
        ..record.clone()
    };
    assert!(backlog
        .mark_completed(lease, &[record.clone(), emergent.clone()])
        .await
        .unwrap());

    let stored = skills.list_for_document(id).await.unwrap();
    assert_eq!(stored, vec![record, emergent]);

    let claim = backlog.get_claim(id).await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert!(claim.completed_at.is_some());

    // Completed documents cannot be completed again.
    assert!(!backlog.mark_completed(lease, &[]).await.unwrap());
    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_concurrent_claims_skip_locked_rows() {
    let _guard = LOCK.lock().await;
    let db = setup().await;
    let store = Arc::new(PgBacklogStore::new(db.pool.clone()));
    // Leftovers from earlier runs would eat into the claim capacity.
    store.claim_batch(0, 1, 10_000).await.unwrap();

    let mut ours = HashSet::new();
    for i in 0..10 {
        ours.insert(db.insert_posting(&format!("posting {}", i)).await.unwrap());
    }

    let workers = 4usize;
    let mut handles = Vec::new();
    for worker_id in 0..workers {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.claim_batch(worker_id, workers, 3).await
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        let batch = handle.await.unwrap().unwrap();
        claimed.extend(batch.into_iter().map(|d| d.id()).filter(|id| ours.contains(id)));
    }
    let unique: HashSet<Uuid> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), unique.len(), "a document was claimed twice");
    assert_eq!(unique.len(), 10);
    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_failure_requeue_and_stale_reset() {
    let _guard = LOCK.lock().await;
    let db = setup().await;
    let backlog = PgBacklogStore::new(db.pool.clone());

    let id = db.insert_posting("Kubernetes").await.unwrap();
    let ours: HashSet<Uuid> = [id].into_iter().collect();

    let lease = claim_ours(&backlog, &ours, 1000).await[0];
    assert_eq!(lease.document_id, id);
    assert!(backlog.mark_failed(lease, "recognizer unavailable").await.unwrap());
    let claim = backlog.get_claim(id).await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Failed);
    assert_eq!(claim.error_message.as_deref(), Some("recognizer unavailable"));

    assert!(backlog.requeue_failed(3).await.unwrap() >= 1);
    let leases = claim_ours(&backlog, &ours, 1000).await;
    assert_eq!(leases, vec![ClaimLease { document_id: id, attempt: 2 }]);
    assert_eq!(backlog.get_claim(id).await.unwrap().unwrap().attempts, 2);

    // Fresh claims survive a long timeout; a zero timeout resets them.
    backlog.reset_stale(Duration::from_secs(3600)).await.unwrap();
    assert_eq!(
        backlog.get_claim(id).await.unwrap().unwrap().status,
        ClaimStatus::Processing
    );
    assert!(backlog.reset_stale(Duration::ZERO).await.unwrap() >= 1);
    assert_eq!(
        backlog.get_claim(id).await.unwrap().unwrap().status,
        ClaimStatus::Pending
    );

    let stats = backlog.stats().await.unwrap();
    assert!(stats.pending >= 1);
    assert_eq!(
        stats.total,
        stats.pending + stats.processing + stats.completed + stats.failed
    );
    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_reclaimed_row_rejects_previous_lease() {
    let _guard = LOCK.lock().await;
    let db = setup().await;
    let backlog = PgBacklogStore::new(db.pool.clone());

    let id = db.insert_posting("Terraform").await.unwrap();
    let ours: HashSet<Uuid> = [id].into_iter().collect();

    let stalled = claim_ours_as(&backlog, 0, &ours, 1000).await[0];
    assert!(backlog.reset_stale(Duration::ZERO).await.unwrap() >= 1);
    let live = claim_ours_as(&backlog, 1, &ours, 1000).await[0];
    assert_eq!(live.attempt, stalled.attempt + 1);

    assert!(!backlog.mark_failed(stalled, "late report").await.unwrap());
    assert!(!backlog.mark_completed(stalled, &[]).await.unwrap());
    backlog.requeue_failed(10).await.unwrap();
    assert!(claim_ours(&backlog, &ours, 1000).await.is_empty());

    let claim = backlog.get_claim(id).await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Processing);
    assert_eq!(claim.claimed_by.as_deref(), Some("worker-1"));

    assert!(backlog.mark_completed(live, &[]).await.unwrap());
    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_taxonomy_store_lookups() {
    let db = setup().await;
    let suffix = Uuid::new_v4().simple().to_string();
    let uri = format!("test:gestion-{}", suffix);
    let label = format!("Gestión de proyectos {}", suffix);
    let entry = TaxonomyEntry::new(uri.clone(), "es", label.clone())
        .with_label(LocalizedLabel::alternative("en", format!("Project management {}", suffix)))
        .with_skill_type("skill/competence");
    db.insert_taxonomy_entry(&entry).await.unwrap();

    let store = PgTaxonomyStore::new(db.pool.clone());

    let exact = store.lookup_by_label(&label.to_ascii_uppercase()).await.unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].uri, uri);
    assert_eq!(exact[0].labels.len(), 2);
    assert!(exact[0].labels[0].preferred);

    let by_token = store
        .lookup_candidates_by_token(&["gestion".to_string(), suffix.clone()])
        .await
        .unwrap();
    assert!(by_token.iter().any(|e| e.uri == uri));

    let all = store.all_entries().await.unwrap();
    assert!(all.iter().any(|e| e.uri == uri && e.active));
    db.cleanup().await.unwrap();
}
