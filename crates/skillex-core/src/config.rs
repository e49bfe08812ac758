//! Runtime configuration for extraction, matching, and backlog workers.
//!
//! Both config types follow the same shape: `Default` from [`crate::defaults`],
//! `from_env()` for deployment, `with_*` builders for code and tests, and
//! `validate()` to reject settings the engine cannot honor.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Which extraction engine feeds the taxonomy matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Pattern + entity extraction, resolved by the three-layer cascade.
    #[default]
    Cascade,
    /// Exhaustive n-gram lookup against the taxonomy index.
    Ngram,
    /// Both engines; records merged by normalized skill text.
    Hybrid,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Cascade => "cascade",
            ExtractionMode::Ngram => "ngram",
            ExtractionMode::Hybrid => "hybrid",
        }
    }

    /// Whether the pattern/entity + cascade path runs.
    pub fn uses_cascade(&self) -> bool {
        matches!(self, ExtractionMode::Cascade | ExtractionMode::Hybrid)
    }

    /// Whether the n-gram engine runs.
    pub fn uses_ngram(&self) -> bool {
        matches!(self, ExtractionMode::Ngram | ExtractionMode::Hybrid)
    }
}

impl FromStr for ExtractionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(ExtractionMode::Cascade),
            "ngram" => Ok(ExtractionMode::Ngram),
            "hybrid" => Ok(ExtractionMode::Hybrid),
            other => Err(Error::Config(format!("unknown extraction mode: {}", other))),
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matching and extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Fuzzy threshold for mentions of at most four characters.
    pub fuzzy_threshold_short: f64,
    /// Fuzzy threshold for all other mentions.
    pub fuzzy_threshold_default: f64,
    /// Enable the semantic (embedding) layer.
    pub semantic_enabled: bool,
    /// Minimum cosine similarity for a semantic match.
    pub semantic_threshold: f64,
    /// Neighbours retrieved per semantic query.
    pub semantic_top_k: usize,
    /// Largest n-gram generated by the n-gram engine.
    pub ngram_max_size: usize,
    /// Shortest document n-gram (in characters) looked up.
    pub ngram_min_chars: usize,
    /// Engine selection.
    pub mode: ExtractionMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold_short: defaults::FUZZY_THRESHOLD_SHORT,
            fuzzy_threshold_default: defaults::FUZZY_THRESHOLD_DEFAULT,
            semantic_enabled: defaults::SEMANTIC_ENABLED,
            semantic_threshold: defaults::SEMANTIC_THRESHOLD,
            semantic_top_k: defaults::SEMANTIC_TOP_K,
            ngram_max_size: defaults::NGRAM_MAX_SIZE,
            ngram_min_chars: defaults::NGRAM_MIN_CHARS,
            mode: ExtractionMode::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SKILLEX_FUZZY_THRESHOLD_SHORT` | `0.95` | Fuzzy threshold, mentions ≤4 chars |
    /// | `SKILLEX_FUZZY_THRESHOLD_DEFAULT` | `0.92` | Fuzzy threshold otherwise |
    /// | `SKILLEX_SEMANTIC_ENABLED` | `false` | Enable the semantic layer |
    /// | `SKILLEX_SEMANTIC_THRESHOLD` | `0.87` | Cosine acceptance threshold |
    /// | `SKILLEX_SEMANTIC_TOP_K` | `5` | Neighbours per query |
    /// | `SKILLEX_NGRAM_MAX_SIZE` | `4` | Largest n-gram |
    /// | `SKILLEX_NGRAM_MIN_CHARS` | `3` | Shortest document n-gram looked up |
    /// | `SKILLEX_EXTRACTION_MODE` | `cascade` | `cascade`, `ngram` or `hybrid` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();
        let config = Self {
            fuzzy_threshold_short: parse_or(
                &lookup,
                "SKILLEX_FUZZY_THRESHOLD_SHORT",
                base.fuzzy_threshold_short,
            )?,
            fuzzy_threshold_default: parse_or(
                &lookup,
                "SKILLEX_FUZZY_THRESHOLD_DEFAULT",
                base.fuzzy_threshold_default,
            )?,
            semantic_enabled: lookup("SKILLEX_SEMANTIC_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(base.semantic_enabled),
            semantic_threshold: parse_or(
                &lookup,
                "SKILLEX_SEMANTIC_THRESHOLD",
                base.semantic_threshold,
            )?,
            semantic_top_k: parse_or(&lookup, "SKILLEX_SEMANTIC_TOP_K", base.semantic_top_k)?,
            ngram_max_size: parse_or(&lookup, "SKILLEX_NGRAM_MAX_SIZE", base.ngram_max_size)?,
            ngram_min_chars: parse_or(&lookup, "SKILLEX_NGRAM_MIN_CHARS", base.ngram_min_chars)?,
            mode: match lookup("SKILLEX_EXTRACTION_MODE") {
                Some(v) => v.parse()?,
                None => base.mode,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_fuzzy_thresholds(mut self, short: f64, default: f64) -> Self {
        self.fuzzy_threshold_short = short;
        self.fuzzy_threshold_default = default;
        self
    }

    pub fn with_semantic(mut self, enabled: bool) -> Self {
        self.semantic_enabled = enabled;
        self
    }

    pub fn with_semantic_threshold(mut self, threshold: f64) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_ngram_max_size(mut self, size: usize) -> Self {
        self.ngram_max_size = size;
        self
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reject settings outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fuzzy_threshold_short", self.fuzzy_threshold_short),
            ("fuzzy_threshold_default", self.fuzzy_threshold_default),
            ("semantic_threshold", self.semantic_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.semantic_top_k == 0 {
            return Err(Error::Config("semantic_top_k must be > 0".into()));
        }
        if self.ngram_max_size == 0 {
            return Err(Error::Config("ngram_max_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Backlog claiming and worker loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Documents claimed per batch.
    pub batch_size: usize,
    /// Number of hash partitions over the backlog.
    pub worker_count: usize,
    /// Run a single worker with this partition id instead of one per partition.
    pub worker_id: Option<usize>,
    /// Per-document processing bound in seconds.
    pub document_timeout_secs: u64,
    /// Attempt cap applied by `requeue_failed`.
    pub max_attempts: i32,
    /// Age after which a `processing` claim is considered abandoned.
    pub stale_timeout_secs: u64,
    /// Idle sleep between polls when nothing was claimed.
    pub poll_interval_ms: u64,
    /// Interval between reaper passes.
    pub reaper_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            worker_count: defaults::WORKER_COUNT,
            worker_id: None,
            document_timeout_secs: defaults::DOCUMENT_TIMEOUT_SECS,
            max_attempts: defaults::MAX_ATTEMPTS,
            stale_timeout_secs: defaults::STALE_TIMEOUT_SECS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            reaper_interval_secs: defaults::REAPER_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SKILLEX_BATCH_SIZE` | `10` | Documents per claim |
    /// | `SKILLEX_WORKER_COUNT` | `1` | Partition count |
    /// | `SKILLEX_WORKER_ID` | unset | Run only this partition's worker |
    /// | `SKILLEX_DOCUMENT_TIMEOUT_SECS` | `300` | Per-document bound |
    /// | `SKILLEX_MAX_ATTEMPTS` | `3` | Retry cap |
    /// | `SKILLEX_STALE_TIMEOUT_SECS` | `1800` | Reaper threshold |
    /// | `SKILLEX_POLL_INTERVAL_MS` | `5000` | Idle sleep |
    /// | `SKILLEX_REAPER_INTERVAL_SECS` | `60` | Reaper period |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();
        let worker_id = match lookup("SKILLEX_WORKER_ID") {
            Some(v) if !v.trim().is_empty() => Some(v.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("SKILLEX_WORKER_ID is not a number: {}", v))
            })?),
            _ => None,
        };
        let config = Self {
            batch_size: parse_or(&lookup, "SKILLEX_BATCH_SIZE", base.batch_size)?,
            worker_count: parse_or(&lookup, "SKILLEX_WORKER_COUNT", base.worker_count)?,
            worker_id,
            document_timeout_secs: parse_or(
                &lookup,
                "SKILLEX_DOCUMENT_TIMEOUT_SECS",
                base.document_timeout_secs,
            )?,
            max_attempts: parse_or(&lookup, "SKILLEX_MAX_ATTEMPTS", base.max_attempts)?,
            stale_timeout_secs: parse_or(
                &lookup,
                "SKILLEX_STALE_TIMEOUT_SECS",
                base.stale_timeout_secs,
            )?,
            poll_interval_ms: parse_or(&lookup, "SKILLEX_POLL_INTERVAL_MS", base.poll_interval_ms)?,
            reaper_interval_secs: parse_or(
                &lookup,
                "SKILLEX_REAPER_INTERVAL_SECS",
                base.reaper_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_worker_id(mut self, id: usize) -> Self {
        self.worker_id = Some(id);
        self
    }

    pub fn with_document_timeout(mut self, secs: u64) -> Self {
        self.document_timeout_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_stale_timeout(mut self, secs: u64) -> Self {
        self.stale_timeout_secs = secs;
        self
    }

    /// Partition ids this process should run workers for.
    pub fn worker_ids(&self) -> Vec<usize> {
        match self.worker_id {
            Some(id) => vec![id],
            None => (0..self.worker_count).collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".into()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be > 0".into()));
        }
        if let Some(id) = self.worker_id {
            if id >= self.worker_count {
                return Err(Error::Config(format!(
                    "worker_id {} out of range for worker_count {}",
                    id, self.worker_count
                )));
            }
        }
        if self.max_attempts < 1 {
            return Err(Error::Config("max_attempts must be >= 1".into()));
        }
        if self.document_timeout_secs == 0 {
            return Err(Error::Config("document_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        _ => Ok(default),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_extraction_config_default() {
        let config = ExtractionConfig::default();
        assert_eq!(config.fuzzy_threshold_short, 0.95);
        assert_eq!(config.fuzzy_threshold_default, 0.92);
        assert!(!config.semantic_enabled);
        assert_eq!(config.semantic_threshold, 0.87);
        assert_eq!(config.ngram_max_size, 4);
        assert_eq!(config.mode, ExtractionMode::Cascade);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extraction_config_from_lookup() {
        let config = ExtractionConfig::from_lookup(lookup_from(&[
            ("SKILLEX_SEMANTIC_ENABLED", "true"),
            ("SKILLEX_SEMANTIC_THRESHOLD", "0.9"),
            ("SKILLEX_EXTRACTION_MODE", "hybrid"),
            ("SKILLEX_NGRAM_MAX_SIZE", "3"),
        ]))
        .unwrap();
        assert!(config.semantic_enabled);
        assert_eq!(config.semantic_threshold, 0.9);
        assert_eq!(config.mode, ExtractionMode::Hybrid);
        assert_eq!(config.ngram_max_size, 3);
        assert_eq!(config.fuzzy_threshold_short, 0.95);
    }

    #[test]
    fn test_extraction_config_rejects_out_of_range_threshold() {
        let err = ExtractionConfig::from_lookup(lookup_from(&[(
            "SKILLEX_FUZZY_THRESHOLD_DEFAULT",
            "1.5",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_extraction_config_rejects_garbage() {
        let err =
            ExtractionConfig::from_lookup(lookup_from(&[("SKILLEX_SEMANTIC_TOP_K", "many")]))
                .unwrap_err();
        assert!(err.to_string().contains("SKILLEX_SEMANTIC_TOP_K"));
    }

    #[test]
    fn test_extraction_mode_parse() {
        assert_eq!("NGRAM".parse::<ExtractionMode>().unwrap(), ExtractionMode::Ngram);
        assert!("llm".parse::<ExtractionMode>().is_err());
        assert!(ExtractionMode::Hybrid.uses_cascade());
        assert!(ExtractionMode::Hybrid.uses_ngram());
        assert!(!ExtractionMode::Cascade.uses_ngram());
        assert!(!ExtractionMode::Ngram.uses_cascade());
    }

    #[test]
    fn test_extraction_config_builders() {
        let config = ExtractionConfig::default()
            .with_semantic(true)
            .with_fuzzy_thresholds(0.9, 0.85)
            .with_mode(ExtractionMode::Ngram);
        assert!(config.semantic_enabled);
        assert_eq!(config.fuzzy_threshold_short, 0.9);
        assert_eq!(config.fuzzy_threshold_default, 0.85);
        assert_eq!(config.mode, ExtractionMode::Ngram);
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.worker_id, None);
        assert_eq!(config.document_timeout_secs, 300);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.worker_ids(), vec![0]);
    }

    #[test]
    fn test_worker_config_from_lookup() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("SKILLEX_BATCH_SIZE", "25"),
            ("SKILLEX_WORKER_COUNT", "4"),
            ("SKILLEX_WORKER_ID", "2"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.worker_ids(), vec![2]);
    }

    #[test]
    fn test_worker_config_rejects_worker_id_out_of_range() {
        let err = WorkerConfig::from_lookup(lookup_from(&[
            ("SKILLEX_WORKER_COUNT", "2"),
            ("SKILLEX_WORKER_ID", "2"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_worker_config_rejects_zero_batch() {
        let config = WorkerConfig::default().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_ids_cover_all_partitions() {
        let config = WorkerConfig::default().with_worker_count(3);
        assert_eq!(config.worker_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }
}
