//! # skillex-extract
//!
//! Skill mention extraction for skillex.
//!
//! - [`PatternExtractor`]: curated, categorized table of technical terms.
//! - [`EntityExtractor`]: statistical recognizer output filtered by
//!   "looks like a technical skill" heuristics.
//! - [`merge_candidates`]: union of the two, pattern output winning ties.
//! - [`NgramIndex`] / [`NgramExtractor`]: exhaustive n-gram lookup against
//!   the taxonomy with longest-match overlap resolution.

pub mod entity;
pub mod merge;
pub mod ngram;
pub mod pattern;

pub use entity::{looks_like_skill, EntityExtractor};
pub use merge::merge_candidates;
pub use ngram::{NgramExtraction, NgramExtractor, NgramIndex, NgramMatch, NgramMetadata};
pub use pattern::PatternExtractor;
