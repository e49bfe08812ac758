//! Layer 2: token pre-filter + length-adaptive edit similarity.
//!
//! | Mention length | Score | Threshold |
//! |----------------|-------|-----------|
//! | ≤ 4 chars | full-string ratio only | short (0.95) |
//! | 5–6 chars, label longer | max(ratio, substring ratio) | default (0.92) |
//! | otherwise | full-string ratio | default (0.92) |
//!
//! Short mentions never use the substring ratio: "REST" inside an unrelated
//! long label would otherwise score 1.0.

use async_trait::async_trait;
use skillex_core::defaults::{
    FUZZY_THRESHOLD_DEFAULT, FUZZY_THRESHOLD_SHORT, MIN_TOKEN_CHARS, PARTIAL_MENTION_MAX_CHARS,
    SHORT_MENTION_MAX_CHARS,
};
use skillex_core::text::{char_len, tokenize};
use skillex_core::{
    round3, MatchMethod, Result, TaxonomyEntry, TaxonomyMatchResult, TaxonomyStore,
};
use tracing::trace;

use crate::cascade::MatchLayer;
use crate::similarity::{partial_ratio, ratio};

/// Highest confidence a non-exact layer reports; 1.0 is reserved for exact.
pub(crate) const MAX_INEXACT_CONFIDENCE: f64 = 0.999;

/// Candidates scored between yields to the runtime.
const SCORE_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct FuzzyLayer {
    threshold_short: f64,
    threshold_default: f64,
}

impl Default for FuzzyLayer {
    fn default() -> Self {
        Self::new(FUZZY_THRESHOLD_SHORT, FUZZY_THRESHOLD_DEFAULT)
    }
}

impl FuzzyLayer {
    pub fn new(threshold_short: f64, threshold_default: f64) -> Self {
        Self {
            threshold_short,
            threshold_default,
        }
    }

    /// Threshold a mention of this length must reach.
    pub fn threshold_for(&self, mention_chars: usize) -> f64 {
        if mention_chars <= SHORT_MENTION_MAX_CHARS {
            self.threshold_short
        } else {
            self.threshold_default
        }
    }

    /// Score one label against a mention.
    pub fn score(&self, mention: &str, label: &str) -> f64 {
        let mention_chars = char_len(mention);
        let label_chars = char_len(label);
        if mention_chars > SHORT_MENTION_MAX_CHARS
            && mention_chars <= PARTIAL_MENTION_MAX_CHARS
            && label_chars > mention_chars
        {
            ratio(mention, label).max(partial_ratio(mention, label))
        } else {
            ratio(mention, label)
        }
    }

    /// Best label among `candidates` and the running `best`, ignoring the
    /// threshold.
    fn best<'a>(
        &self,
        mention: &str,
        candidates: &'a [TaxonomyEntry],
        mut best: Option<(&'a TaxonomyEntry, &'a str, f64)>,
    ) -> Option<(&'a TaxonomyEntry, &'a str, f64)> {
        let prefix = mention.to_lowercase();

        for entry in candidates {
            for label in entry.all_labels() {
                let score = self.score(mention, label);
                let better = match best {
                    None => true,
                    Some((_, best_label, best_score)) => {
                        score > best_score
                            || (score == best_score
                                && label.to_lowercase().starts_with(&prefix)
                                && !best_label.to_lowercase().starts_with(&prefix))
                    }
                };
                if better {
                    best = Some((entry, label, score));
                }
            }
        }
        best
    }
}

#[async_trait]
impl MatchLayer for FuzzyLayer {
    fn method(&self) -> MatchMethod {
        MatchMethod::Fuzzy
    }

    async fn attempt(
        &self,
        mention: &str,
        store: &dyn TaxonomyStore,
    ) -> Result<Option<TaxonomyMatchResult>> {
        let mention = mention.trim();
        let tokens: Vec<String> = tokenize(mention)
            .into_iter()
            .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
            .collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        let candidates = store.lookup_candidates_by_token(&tokens).await?;
        let threshold = self.threshold_for(char_len(mention));

        let mut best = None;
        for chunk in candidates.chunks(SCORE_CHUNK) {
            best = self.best(mention, chunk, best);
            tokio::task::yield_now().await;
        }
        let Some((entry, label, score)) = best else {
            return Ok(None);
        };
        trace!(
            mention,
            label,
            score,
            threshold,
            candidates = candidates.len(),
            "Best fuzzy candidate"
        );
        if score < threshold {
            return Ok(None);
        }
        Ok(Some(TaxonomyMatchResult::new(
            mention,
            entry,
            label,
            round3(score).min(MAX_INEXACT_CONFIDENCE),
            MatchMethod::Fuzzy,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TaxonomySnapshot;

    fn snap(labels: &[(&str, &str)]) -> TaxonomySnapshot {
        TaxonomySnapshot::new(
            labels
                .iter()
                .map(|(uri, label)| TaxonomyEntry::new(*uri, "en", *label))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_short_mention_no_substring_match() {
        let snap = snap(&[("u:rest", "Restaurant and hospitality services management")]);
        let result = FuzzyLayer::default().attempt("REST", &snap).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_short_mention_shared_token_still_needs_full_ratio() {
        let snap = snap(&[("u:api", "REST API design")]);
        let result = FuzzyLayer::default().attempt("REST", &snap).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_abbreviation_substring_allowance() {
        let snap = snap(&[("u:rn", "React Native")]);
        let result = FuzzyLayer::default()
            .attempt("React", &snap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.uri, "u:rn");
        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert!(result.confidence >= 0.92);
        assert!(result.confidence < 1.0);
    }

    #[tokio::test]
    async fn test_long_mention_uses_full_ratio_only() {
        let snap = snap(&[("u:k8s", "Kubernetes cluster administration")]);
        let result = FuzzyLayer::default().attempt("Kubernetes", &snap).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_typo_matches_above_threshold() {
        let snap = snap(&[("u:pg", "postgresql database")]);
        let result = FuzzyLayer::default()
            .attempt("postgresql databse", &snap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.uri, "u:pg");
        assert_eq!(result.confidence, 0.947);
    }

    #[tokio::test]
    async fn test_tie_break_prefers_prefix_label() {
        // Both labels reach a substring score of 1.0 for "Spark".
        let snap = snap(&[("u:a", "Apache Spark"), ("u:b", "Spark SQL")]);
        let result = FuzzyLayer::default()
            .attempt("Spark", &snap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.uri, "u:b");
        assert_eq!(result.label, "Spark SQL");
    }

    #[tokio::test]
    async fn test_best_candidate_found_across_chunks() {
        let mut entries: Vec<TaxonomyEntry> = (0..SCORE_CHUNK * 3)
            .map(|i| TaxonomyEntry::new(format!("u:{:03}", i), "en", format!("postgresql tuning {}", i)))
            .collect();
        entries.insert(SCORE_CHUNK * 2 + 5, TaxonomyEntry::new("u:pg", "en", "postgresql database"));
        let snap = TaxonomySnapshot::new(entries);

        let result = FuzzyLayer::default()
            .attempt("postgresql databse", &snap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.uri, "u:pg");
        assert_eq!(result.confidence, 0.947);
    }

    #[tokio::test]
    async fn test_no_candidates_no_match() {
        let snap = snap(&[("u:1", "Python")]);
        assert!(FuzzyLayer::default().attempt("Haskell", &snap).await.unwrap().is_none());
        assert!(FuzzyLayer::default().attempt("!!", &snap).await.unwrap().is_none());
    }

    #[test]
    fn test_thresholds_by_length() {
        let layer = FuzzyLayer::default();
        assert_eq!(layer.threshold_for(4), 0.95);
        assert_eq!(layer.threshold_for(5), 0.92);
        assert_eq!(layer.threshold_for(12), 0.92);
    }
}
