//! Layer 1: case-insensitive label equality.

use async_trait::async_trait;
use skillex_core::{MatchMethod, Result, TaxonomyMatchResult, TaxonomyStore};

use crate::cascade::MatchLayer;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactLayer;

#[async_trait]
impl MatchLayer for ExactLayer {
    fn method(&self) -> MatchMethod {
        MatchMethod::Exact
    }

    async fn attempt(
        &self,
        mention: &str,
        store: &dyn TaxonomyStore,
    ) -> Result<Option<TaxonomyMatchResult>> {
        let wanted = mention.trim().to_lowercase();
        let entries = store.lookup_by_label(mention.trim()).await?;
        Ok(entries.first().map(|entry| {
            let label = entry
                .all_labels()
                .find(|l| l.trim().to_lowercase() == wanted)
                .unwrap_or_else(|| entry.primary_label());
            TaxonomyMatchResult::new(mention, entry, label, 1.0, MatchMethod::Exact)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TaxonomySnapshot;
    use skillex_core::{LocalizedLabel, TaxonomyEntry};

    #[tokio::test]
    async fn test_exact_matches_any_locale() {
        let snap = TaxonomySnapshot::new(vec![TaxonomyEntry::new(
            "u:db",
            "es",
            "Bases de datos",
        )
        .with_label(LocalizedLabel::preferred("en", "Databases"))]);
        let result = ExactLayer.attempt("databases", &snap).await.unwrap().unwrap();
        assert_eq!(result.uri, "u:db");
        assert_eq!(result.label, "Databases");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.method, MatchMethod::Exact);
    }

    #[tokio::test]
    async fn test_exact_miss() {
        let snap = TaxonomySnapshot::new(vec![TaxonomyEntry::new("u:1", "en", "Python")]);
        assert!(ExactLayer.attempt("Pythonic", &snap).await.unwrap().is_none());
    }
}
