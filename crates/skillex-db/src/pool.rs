//! Connection pool shared by the backlog workers and the reaper.
//!
//! Every worker holds at most one connection at a time: a claim, a
//! completion or a failure report is a single statement or a short
//! transaction. The pool is therefore sized from the worker count rather
//! than from request concurrency.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use skillex_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time a worker waits for a free connection, in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Connections beyond the workers: one for the reaper, one for stats and
/// ad-hoc enqueues.
const SHARED_CONNECTIONS: usize = 2;

/// Name reported in `pg_stat_activity`, so stuck claims can be traced to
/// the process holding them.
pub const DEFAULT_APPLICATION_NAME: &str = "skillex-worker";

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections kept open between batches.
    pub min_connections: u32,
    /// How long a claim or report waits for a connection before failing.
    /// A failed claim goes through the worker's retry policy.
    pub acquire_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Connections older than this are recycled.
    pub max_lifetime: Option<Duration>,
    pub application_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the pool for `worker_count` claiming workers plus the shared
    /// connections. Never smaller than [`DEFAULT_MAX_CONNECTIONS`], and the
    /// workers' connections stay warm between batches.
    pub fn for_workers(worker_count: usize) -> Self {
        let needed = u32::try_from(worker_count.saturating_add(SHARED_CONNECTIONS))
            .unwrap_or(u32::MAX);
        let warm = u32::try_from(worker_count.max(1)).unwrap_or(u32::MAX);
        let max = needed.max(DEFAULT_MAX_CONNECTIONS);
        Self::default().max_connections(max).min_connections(warm.min(max))
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set how long callers wait for a connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        application_name = %config.application_name,
        "Creating database connection pool"
    );

    let connect = PgConnectOptions::from_str(database_url)
        .map_err(Error::Database)?
        .application_name(&config.application_name);

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options
        .connect_with(connect)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Point-in-time view of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out; the next claim will wait up
    /// to the acquire timeout.
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.size > 0
    }
}

/// Log current pool health.
///
/// Emits a debug-level record on every call and a warning when no idle
/// connection is left, which usually means workers are stuck mid-report.
pub fn log_pool_metrics(pool: &PgPool) {
    let health = PoolHealth::of(pool);

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = health.size,
        pool_idle = health.idle,
        "Pool health check"
    );

    if health.is_exhausted() {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = health.size,
            "Connection pool has no idle connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(60))
            .application_name("skillex-reaper");

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.application_name, "skillex-reaper");
    }

    #[test]
    fn test_pool_config_for_workers() {
        let small = PoolConfig::for_workers(1);
        assert_eq!(small.max_connections, 10);
        assert_eq!(small.min_connections, 1);

        let large = PoolConfig::for_workers(16);
        assert_eq!(large.max_connections, 18);
        assert_eq!(large.min_connections, 16);

        assert_eq!(PoolConfig::for_workers(0).min_connections, 1);
    }

    #[test]
    fn test_pool_health_exhaustion() {
        assert!(PoolHealth { size: 4, idle: 0 }.is_exhausted());
        assert!(!PoolHealth { size: 4, idle: 1 }.is_exhausted());
        assert!(!PoolHealth { size: 0, idle: 0 }.is_exhausted());
    }
}
