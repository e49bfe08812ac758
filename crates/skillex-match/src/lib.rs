//! # skillex-match
//!
//! Resolves skill mentions to taxonomy entries through an ordered cascade of
//! match layers:
//!
//! 1. [`ExactLayer`]: case-insensitive label equality, confidence 1.0
//! 2. [`FuzzyLayer`]: token pre-filter + length-adaptive edit similarity
//! 3. [`SemanticLayer`]: embedding nearest neighbour with a sanity filter
//!    (off unless enabled)
//!
//! A mention no layer resolves is *emergent*.

pub mod cascade;
pub mod exact;
pub mod fuzzy;
pub mod semantic;
pub mod similarity;
pub mod snapshot;
pub mod stats;

pub use cascade::{MatchLayer, TaxonomyMatcher};
pub use exact::ExactLayer;
pub use fuzzy::FuzzyLayer;
pub use semantic::{DomainSanityFilter, SemanticIndex, SemanticLayer};
pub use similarity::{partial_ratio, ratio};
pub use snapshot::TaxonomySnapshot;
pub use stats::MatchingStats;
