//! Union of pattern and entity mentions.

use std::collections::HashSet;

use skillex_core::CandidateSkillMention;

/// Merge pattern and entity mentions, deduplicating by lowercased text.
///
/// Pattern mentions (higher confidence) win when both extractors produced the
/// same text. Order is stable: pattern mentions first, then surviving entity
/// mentions, each in input order.
pub fn merge_candidates(
    pattern: Vec<CandidateSkillMention>,
    entity: Vec<CandidateSkillMention>,
) -> Vec<CandidateSkillMention> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(pattern.len() + entity.len());
    for mention in pattern.into_iter().chain(entity) {
        if seen.insert(mention.key()) {
            merged.push(mention);
        }
    }
    merged
}
