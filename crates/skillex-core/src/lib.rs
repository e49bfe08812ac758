//! # skillex-core
//!
//! Core types, traits, and configuration for the skillex skill extraction engine.
//!
//! This crate provides the domain model (documents, mentions, taxonomy entries,
//! match results, persisted skill records, backlog claims), the shared error type,
//! and the store/backend traits the other skillex crates implement or consume.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{ExtractionConfig, ExtractionMode, WorkerConfig};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

/// Embedding vector type (shared with pgvector).
pub use pgvector::Vector;

/// Generate a new time-ordered UUIDv7 identifier.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
