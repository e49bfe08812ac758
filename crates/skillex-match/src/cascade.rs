//! Ordered cascade of match layers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use skillex_core::defaults::MIN_MENTION_CHARS;
use skillex_core::text::char_len;
use skillex_core::{
    EmbeddingBackend, ExtractionConfig, MatchMethod, Result, TaxonomyMatchResult, TaxonomyStore,
};
use tracing::{debug, info, instrument, warn};

use crate::exact::ExactLayer;
use crate::fuzzy::FuzzyLayer;
use crate::semantic::{SemanticIndex, SemanticLayer};
use crate::stats::MatchingStats;

/// One step of the cascade.
#[async_trait]
pub trait MatchLayer: Send + Sync {
    /// Method reported by results of this layer.
    fn method(&self) -> MatchMethod;

    /// Try to resolve `mention`. `Ok(None)` passes the mention to the next layer.
    async fn attempt(
        &self,
        mention: &str,
        store: &dyn TaxonomyStore,
    ) -> Result<Option<TaxonomyMatchResult>>;
}

/// Resolves mentions against an immutable taxonomy store.
///
/// Layers run in order and the first result wins. A layer that errors is
/// logged and treated as "no match"; if every layer passes, the mention is
/// emergent.
pub struct TaxonomyMatcher {
    store: Arc<dyn TaxonomyStore>,
    layers: Vec<Box<dyn MatchLayer>>,
}

impl TaxonomyMatcher {
    /// Exact + fuzzy layers with the configured thresholds.
    pub fn new(store: Arc<dyn TaxonomyStore>, config: &ExtractionConfig) -> Self {
        Self::with_layers(
            store,
            vec![
                Box::new(ExactLayer),
                Box::new(FuzzyLayer::new(
                    config.fuzzy_threshold_short,
                    config.fuzzy_threshold_default,
                )),
            ],
        )
    }

    /// Matcher with an explicit layer list.
    pub fn with_layers(store: Arc<dyn TaxonomyStore>, layers: Vec<Box<dyn MatchLayer>>) -> Self {
        Self { store, layers }
    }

    /// Build the full cascade, adding the semantic layer when enabled.
    ///
    /// If the taxonomy cannot be embedded the semantic layer is dropped with a
    /// warning and the matcher runs with exact + fuzzy only.
    pub async fn build(
        store: Arc<dyn TaxonomyStore>,
        config: &ExtractionConfig,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
    ) -> Result<Self> {
        let mut matcher = Self::new(store.clone(), config);
        if !config.semantic_enabled {
            info!(
                subsystem = "match",
                component = "cascade",
                "Semantic layer disabled; unresolved mentions are emergent after fuzzy"
            );
            return Ok(matcher);
        }
        let Some(embedder) = embedder else {
            warn!(
                subsystem = "match",
                component = "cascade",
                fallback = true,
                "Semantic layer enabled but no embedding backend configured"
            );
            return Ok(matcher);
        };

        let entries = store.all_entries().await?;
        match SemanticIndex::build(&entries, embedder.as_ref()).await {
            Ok(index) => {
                matcher.push_layer(Box::new(
                    SemanticLayer::new(Arc::new(index), embedder)
                        .with_threshold(config.semantic_threshold)
                        .with_top_k(config.semantic_top_k),
                ));
            }
            Err(e) => {
                warn!(
                    subsystem = "match",
                    component = "cascade",
                    error = %e,
                    fallback = true,
                    "Failed to build semantic index; continuing without semantic layer"
                );
            }
        }
        Ok(matcher)
    }

    /// Append a layer after the existing ones.
    pub fn push_layer(&mut self, layer: Box<dyn MatchLayer>) {
        self.layers.push(layer);
    }

    /// Methods of the configured layers, in order.
    pub fn layer_methods(&self) -> Vec<MatchMethod> {
        self.layers.iter().map(|l| l.method()).collect()
    }

    pub fn store(&self) -> &Arc<dyn TaxonomyStore> {
        &self.store
    }

    /// Resolve one mention. `None` means emergent.
    #[instrument(skip(self), fields(subsystem = "match", component = "cascade"))]
    pub async fn match_mention(&self, mention: &str) -> Option<TaxonomyMatchResult> {
        let trimmed = mention.trim();
        if char_len(trimmed) < MIN_MENTION_CHARS {
            return None;
        }

        for layer in &self.layers {
            match layer.attempt(trimmed, self.store.as_ref()).await {
                Ok(Some(result)) => {
                    debug!(
                        match_method = result.method.as_str(),
                        taxonomy_uri = %result.uri,
                        score = result.confidence,
                        "Mention matched"
                    );
                    return Some(result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        match_method = layer.method().as_str(),
                        error = %e,
                        "Match layer failed; treating as no match"
                    );
                }
            }
        }
        debug!("Mention is emergent");
        None
    }

    /// Resolve many mentions; duplicates are matched once.
    pub async fn batch_match(
        &self,
        mentions: &[String],
    ) -> BTreeMap<String, Option<TaxonomyMatchResult>> {
        let mut outcomes = BTreeMap::new();
        for mention in mentions {
            if outcomes.contains_key(mention) {
                continue;
            }
            let result = self.match_mention(mention).await;
            outcomes.insert(mention.clone(), result);
        }
        outcomes
    }

    /// Match `mentions` and summarize the outcomes.
    pub async fn matching_stats(&self, mentions: &[String]) -> MatchingStats {
        let outcomes = self.batch_match(mentions).await;
        MatchingStats::from_outcomes(outcomes.values().map(|o| o.as_ref()))
    }
}
