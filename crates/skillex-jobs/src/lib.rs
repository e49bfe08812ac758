//! # skillex-jobs
//!
//! Backlog processing for skillex.
//!
//! This crate provides:
//! - The per-document extraction pipeline (cascade, n-gram, or both)
//! - Workers that claim batches from a backlog partition and persist results
//! - A reaper that recovers abandoned claims and requeues failed documents
//! - The `skillex-worker` binary
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use skillex_db::Database;
//! use skillex_jobs::{start_workers, ExtractionPipeline, Reaper};
//! use skillex_match::TaxonomySnapshot;
//!
//! let db = Database::connect("postgres://...").await?;
//! let taxonomy = Arc::new(TaxonomySnapshot::load(db.taxonomy.as_ref()).await?);
//! let pipeline = Arc::new(ExtractionPipeline::build(taxonomy, &extraction, None, None).await?);
//!
//! let workers = start_workers(db.backlog.clone(), pipeline, &worker_config);
//! let reaper = Reaper::new(db.backlog.clone(), &worker_config).start();
//!
//! for handle in &workers {
//!     handle.shutdown().await?;
//! }
//! reaper.shutdown().await?;
//! ```

pub mod maintenance;
pub mod pipeline;
pub mod retry;
pub mod worker;

// Re-export core types
pub use skillex_core::*;

pub use maintenance::{Reaper, ReaperHandle, ReaperReport};
pub use pipeline::{keep_best_per_skill, DocumentOutcome, ExtractionPipeline};
pub use retry::RetryPolicy;
pub use worker::{start_workers, ExtractionWorker, WorkerEvent, WorkerHandle};
