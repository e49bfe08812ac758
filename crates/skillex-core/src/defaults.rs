//! Centralized default constants for skillex.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types fall back to these when an environment variable is unset.
//!
//! Organized by domain area.

// =============================================================================
// EXTRACTION
// =============================================================================

/// Fixed confidence of a Pattern Extractor hit.
pub const PATTERN_CONFIDENCE: f64 = 0.8;

/// Fixed confidence of a recognized named entity.
pub const NAMED_ENTITY_CONFIDENCE: f64 = 0.6;

/// Fixed confidence of a recognized noun phrase.
pub const NOUN_PHRASE_CONFIDENCE: f64 = 0.5;

/// Extraction confidence of an n-gram engine hit.
pub const NGRAM_CONFIDENCE: f64 = 1.0;

/// Characters of surrounding text kept on each side of a mention.
pub const CONTEXT_WINDOW_CHARS: usize = 50;

/// Largest word count an entity candidate may have.
pub const ENTITY_MAX_WORDS: usize = 5;

// =============================================================================
// MATCHING
// =============================================================================

/// Fuzzy threshold for mentions of at most [`SHORT_MENTION_MAX_CHARS`] characters.
pub const FUZZY_THRESHOLD_SHORT: f64 = 0.95;

/// Fuzzy threshold for every other mention length.
pub const FUZZY_THRESHOLD_DEFAULT: f64 = 0.92;

/// Mentions this short are compared by full-string ratio only.
pub const SHORT_MENTION_MAX_CHARS: usize = 4;

/// Upper bound of the length band that may use the substring ratio.
pub const PARTIAL_MENTION_MAX_CHARS: usize = 6;

/// Mentions shorter than this (after trimming) are never matched.
pub const MIN_MENTION_CHARS: usize = 2;

/// Shortest token considered by the fuzzy pre-filter.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Upper bound on fuzzy pre-filter candidates fetched from a store.
pub const FUZZY_CANDIDATE_LIMIT: i64 = 1000;

/// Whether the semantic layer runs by default.
pub const SEMANTIC_ENABLED: bool = false;

/// Cosine similarity a semantic neighbour must reach.
pub const SEMANTIC_THRESHOLD: f64 = 0.87;

/// Neighbours retrieved per semantic query.
pub const SEMANTIC_TOP_K: usize = 5;

/// Below this shorter/longer length ratio two strings count as very different in length.
pub const SEMANTIC_LENGTH_RATIO_FLOOR: f64 = 0.2;

/// Weight of the extraction confidence in the persisted blend.
pub const EXTRACTION_WEIGHT: f64 = 0.7;

/// Weight of the match confidence in the persisted blend.
pub const MATCH_WEIGHT: f64 = 0.3;

// =============================================================================
// N-GRAM ENGINE
// =============================================================================

/// Largest n-gram generated from labels and documents.
pub const NGRAM_MAX_SIZE: usize = 4;

/// Document n-grams shorter than this are not looked up.
pub const NGRAM_MIN_CHARS: usize = 3;

/// Single-token label n-grams this short are not indexed.
pub const NGRAM_MIN_UNIGRAM_CHARS: usize = 3;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Timeout for one embedding request.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Texts sent to the embedding model per request while indexing the taxonomy.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Timeout for one entity recognition request.
pub const RECOGNIZER_TIMEOUT_SECS: u64 = 30;

/// Minimum score a recognized span must have.
pub const RECOGNIZER_THRESHOLD: f32 = 0.4;

// =============================================================================
// BACKLOG / WORKERS
// =============================================================================

/// Documents claimed per batch.
pub const BATCH_SIZE: usize = 10;

/// Number of hash partitions (and workers) draining the backlog.
pub const WORKER_COUNT: usize = 1;

/// Attempts after which a failed document stays failed.
pub const MAX_ATTEMPTS: i32 = 3;

/// Per-document processing bound in seconds.
pub const DOCUMENT_TIMEOUT_SECS: u64 = 300;

/// Documents in `processing` longer than this are reset by the reaper.
pub const STALE_TIMEOUT_SECS: u64 = 1800;

/// Idle sleep between polls when the backlog is empty.
pub const POLL_INTERVAL_MS: u64 = 5_000;

/// Interval between reaper passes.
pub const REAPER_INTERVAL_SECS: u64 = 60;

/// Claim retry: first backoff delay.
pub const CLAIM_RETRY_BASE_MS: u64 = 200;

/// Claim retry: backoff multiplier.
pub const CLAIM_RETRY_MULTIPLIER: f64 = 2.0;

/// Claim retry: backoff ceiling.
pub const CLAIM_RETRY_MAX_MS: u64 = 10_000;

/// Claim retry: attempts before giving up for this poll cycle.
pub const CLAIM_RETRY_ATTEMPTS: u32 = 5;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/skillex";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_weights_sum_to_one() {
        let sum = EXTRACTION_WEIGHT + MATCH_WEIGHT;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn thresholds_are_ordered() {
        const {
            assert!(SHORT_MENTION_MAX_CHARS < PARTIAL_MENTION_MAX_CHARS);
            assert!(MIN_MENTION_CHARS <= SHORT_MENTION_MAX_CHARS);
        }
        assert!(FUZZY_THRESHOLD_SHORT > FUZZY_THRESHOLD_DEFAULT);
        assert!(SEMANTIC_THRESHOLD < FUZZY_THRESHOLD_DEFAULT);
    }

    #[test]
    fn extraction_confidences_ordered() {
        assert!(PATTERN_CONFIDENCE > NAMED_ENTITY_CONFIDENCE);
        assert!(NAMED_ENTITY_CONFIDENCE > NOUN_PHRASE_CONFIDENCE);
    }

    #[test]
    fn claim_backoff_is_bounded() {
        const {
            assert!(CLAIM_RETRY_BASE_MS < CLAIM_RETRY_MAX_MS);
            assert!(CLAIM_RETRY_ATTEMPTS > 0);
        }
        assert!(CLAIM_RETRY_MULTIPLIER > 1.0);
    }
}
