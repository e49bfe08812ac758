//! Structured logging schema and field name constants for skillex.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied (layer failure, disabled extractor) |
//! | INFO  | Lifecycle events (startup, shutdown), batch summaries |
//! | DEBUG | Decision points (layer hit, claim sizes, config choices) |
//! | TRACE | Per-item iteration (mentions, n-gram hits) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "extract", "match", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "backlog", "cascade", "fuzzy", "ollama", "worker", "reaper"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_batch", "match", "embed_texts", "run_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being processed.
pub const DOCUMENT_ID: &str = "document_id";

/// Worker partition id.
pub const WORKER_ID: &str = "worker_id";

/// Mention text being matched.
pub const MENTION: &str = "mention";

/// Taxonomy URI resolved for a mention.
pub const TAXONOMY_URI: &str = "taxonomy_uri";

/// Match layer that produced a result ("exact", "fuzzy", "semantic").
pub const MATCH_METHOD: &str = "match_method";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a lookup or extraction.
pub const RESULT_COUNT: &str = "result_count";

/// Number of documents claimed in one batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of taxonomy entries loaded into a snapshot or index.
pub const ENTRY_COUNT: &str = "entry_count";

/// Similarity score of a match decision.
pub const SCORE: &str = "score";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message on failure paths.
pub const ERROR_MSG: &str = "error";

/// Whether a fallback path was taken.
pub const FALLBACK: &str = "fallback";
