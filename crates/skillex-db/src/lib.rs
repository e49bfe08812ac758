//! # skillex-db
//!
//! PostgreSQL storage for skillex.
//!
//! This crate provides:
//! - Connection pool management
//! - The extraction backlog and its claim protocol ([`PgBacklogStore`])
//! - Extracted skill record persistence ([`PgSkillRepository`])
//! - Taxonomy access ([`PgTaxonomyStore`])
//! - An in-memory backlog with the same contract ([`MemoryBacklogStore`])

pub mod backlog;
pub mod memory;
pub mod partition;
pub mod pool;
pub mod skills;
pub mod taxonomy;
pub mod test_fixtures;

// Re-export core types
pub use skillex_core::*;

pub use backlog::{worker_label, PgBacklogStore};
pub use memory::MemoryBacklogStore;
pub use partition::{partition_hash, partition_of, PARTITION_SQL};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig, PoolHealth};
pub use skills::PgSkillRepository;
pub use taxonomy::PgTaxonomyStore;

use std::sync::Arc;

/// Combined database access layer.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Extraction backlog and claim protocol.
    pub backlog: Arc<PgBacklogStore>,
    /// Persisted skill records.
    pub skills: Arc<PgSkillRepository>,
    /// Skill taxonomy.
    pub taxonomy: Arc<PgTaxonomyStore>,
}

impl Database {
    /// Create a new database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            backlog: Arc::new(PgBacklogStore::new(pool.clone())),
            skills: Arc::new(PgSkillRepository::new(pool.clone())),
            taxonomy: Arc::new(PgTaxonomyStore::new(pool.clone())),
            pool,
        }
    }

    /// Connect to a database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
