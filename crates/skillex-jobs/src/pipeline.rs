//! Per-document extraction pipeline.
//!
//! Cascade mode runs the pattern and entity extractors, merges their
//! mentions and resolves each one through the taxonomy matcher. N-gram mode
//! looks every document n-gram up in the taxonomy index instead. Hybrid mode
//! runs both and keeps, per normalized skill text, the record with the higher
//! confidence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use skillex_core::{
    Document, EmbeddingBackend, EntityRecognizer, Error, ExtractedSkillRecord, ExtractionConfig,
    ExtractionMode, Result, TaxonomyStore,
};
use skillex_extract::{
    merge_candidates, EntityExtractor, NgramExtractor, NgramIndex, NgramMetadata,
    PatternExtractor,
};
use skillex_match::{MatchingStats, TaxonomyMatcher};

/// Result of running the pipeline over one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub document_id: Uuid,
    /// Records to persist, one per normalized skill text.
    pub records: Vec<ExtractedSkillRecord>,
    /// Candidate mentions after merging (cascade engine only).
    pub mentions: usize,
    pub matching: MatchingStats,
    /// N-gram engine numbers, when it ran.
    pub ngram: Option<NgramMetadata>,
}

impl DocumentOutcome {
    pub fn matched(&self) -> usize {
        self.records.iter().filter(|r| !r.is_emergent()).count()
    }

    pub fn emergent(&self) -> usize {
        self.records.iter().filter(|r| r.is_emergent()).count()
    }
}

/// Extractors and matcher shared by every worker.
pub struct ExtractionPipeline {
    mode: ExtractionMode,
    patterns: PatternExtractor,
    entities: EntityExtractor,
    matcher: Arc<TaxonomyMatcher>,
    ngrams: Option<NgramExtractor>,
}

impl ExtractionPipeline {
    /// Cascade-mode pipeline.
    pub fn new(matcher: Arc<TaxonomyMatcher>, entities: EntityExtractor) -> Self {
        Self {
            mode: ExtractionMode::Cascade,
            patterns: PatternExtractor::new(),
            entities,
            matcher,
            ngrams: None,
        }
    }

    /// Attach an n-gram extractor.
    pub fn with_ngram(mut self, extractor: NgramExtractor) -> Self {
        self.ngrams = Some(extractor);
        self
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the pipeline `config` describes over `store`.
    ///
    /// The n-gram index is only built when the mode uses it; the semantic
    /// layer only when enabled and an embedder is supplied.
    pub async fn build(
        store: Arc<dyn TaxonomyStore>,
        config: &ExtractionConfig,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        recognizer: Option<Arc<dyn EntityRecognizer>>,
    ) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();
        let matcher = TaxonomyMatcher::build(store.clone(), config, embedder).await?;
        let mut pipeline = Self::new(Arc::new(matcher), EntityExtractor::from_option(recognizer))
            .with_mode(config.mode);

        if config.mode.uses_ngram() {
            let entries = store.all_entries().await?;
            let index = NgramIndex::build(&entries, config.ngram_max_size);
            pipeline = pipeline.with_ngram(
                NgramExtractor::new(Arc::new(index)).with_min_chars(config.ngram_min_chars),
            );
        }

        info!(
            subsystem = "jobs",
            component = "pipeline",
            mode = config.mode.as_str(),
            layers = ?pipeline.matcher.layer_methods(),
            entity_extraction = pipeline.entities.is_enabled(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn matcher(&self) -> &Arc<TaxonomyMatcher> {
        &self.matcher
    }

    /// Extract and match skills for one document.
    ///
    /// Extraction completes before matching; the returned records are the
    /// complete set for the document.
    #[instrument(skip(self, document), fields(subsystem = "jobs", component = "pipeline", document_id = %document.id))]
    pub async fn process(&self, document: &Document) -> Result<DocumentOutcome> {
        let text = document.text();
        let mut outcome = DocumentOutcome {
            document_id: document.id,
            ..DocumentOutcome::default()
        };
        let mut records = Vec::new();

        // Matching and lookups are CPU-bound; yielding between steps lets the
        // worker's document timeout fire and other tasks on this thread run.
        if self.mode.uses_cascade() {
            let pattern = self.patterns.extract(document.id, &text);
            tokio::task::yield_now().await;
            let entity = self.entities.extract(document.id, &text).await?;
            let mentions = merge_candidates(pattern, entity);
            outcome.mentions = mentions.len();

            for mention in &mentions {
                tokio::task::yield_now().await;
                let matched = self.matcher.match_mention(&mention.text).await;
                outcome.matching.record(matched.as_ref().map(|m| m.method));
                records.push(ExtractedSkillRecord::from_mention(mention, matched.as_ref()));
            }
        }

        if self.mode.uses_ngram() {
            let ngrams = self.ngrams.as_ref().ok_or_else(|| {
                Error::Config(format!(
                    "extraction mode {} requires an n-gram index",
                    self.mode
                ))
            })?;
            tokio::task::yield_now().await;
            let extraction = ngrams.extract(&text);
            records.extend(ngrams.to_records(document.id, &extraction.matches));
            outcome.ngram = Some(extraction.metadata);
        }

        outcome.records = keep_best_per_skill(records);
        debug!(
            mentions = outcome.mentions,
            result_count = outcome.records.len(),
            matched = outcome.matched(),
            emergent = outcome.emergent(),
            "Document processed"
        );
        Ok(outcome)
    }
}

/// One record per normalized skill text, keeping the highest confidence
/// (the earlier record on ties). Ordered by span with spanless records last,
/// then text, matching the order the stores list records in.
pub fn keep_best_per_skill(records: Vec<ExtractedSkillRecord>) -> Vec<ExtractedSkillRecord> {
    let mut slot: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ExtractedSkillRecord> = Vec::with_capacity(records.len());
    for record in records {
        let key = record.normalized_text();
        match slot.get(&key) {
            Some(&i) => {
                if record.final_confidence > kept[i].final_confidence {
                    kept[i] = record;
                }
            }
            None => {
                slot.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    kept.sort_by(|a, b| {
        a.span_start
            .is_none()
            .cmp(&b.span_start.is_none())
            .then(a.span_start.cmp(&b.span_start))
            .then_with(|| a.skill_text.cmp(&b.skill_text))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillex_core::{ExtractionMethod, MatchMethod, TaxonomyEntry};
    use skillex_match::TaxonomySnapshot;

    fn record(text: &str, method: ExtractionMethod, confidence: f64, start: i32) -> ExtractedSkillRecord {
        ExtractedSkillRecord {
            document_id: Uuid::nil(),
            skill_text: text.to_string(),
            extraction_method: method,
            final_confidence: confidence,
            taxonomy_uri: None,
            match_method: None,
            skill_type: None,
            span_start: Some(start),
            span_end: Some(start + text.chars().count() as i32),
        }
    }

    #[test]
    fn test_keep_best_per_skill_prefers_higher_confidence() {
        let records = vec![
            record("Python", ExtractionMethod::Pattern, 0.86, 10),
            record("Kafka", ExtractionMethod::Entity, 0.42, 0),
            record("python", ExtractionMethod::Ngram, 1.0, 10),
        ];
        let kept = keep_best_per_skill(records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].skill_text, "Kafka");
        assert_eq!(kept[1].extraction_method, ExtractionMethod::Ngram);
    }

    #[test]
    fn test_keep_best_per_skill_tie_keeps_first() {
        let records = vec![
            record("AWS", ExtractionMethod::Pattern, 0.86, 0),
            record("aws", ExtractionMethod::Ngram, 0.86, 0),
        ];
        let kept = keep_best_per_skill(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].extraction_method, ExtractionMethod::Pattern);
    }

    #[test]
    fn test_keep_best_per_skill_orders_spanless_last() {
        let mut spanless = record("Liderazgo", ExtractionMethod::Entity, 0.35, 0);
        spanless.span_start = None;
        spanless.span_end = None;
        let records = vec![
            spanless,
            record("SQL", ExtractionMethod::Pattern, 0.86, 12),
            record("Excel", ExtractionMethod::Pattern, 0.86, 3),
        ];
        let kept = keep_best_per_skill(records);
        let texts: Vec<&str> = kept.iter().map(|r| r.skill_text.as_str()).collect();
        assert_eq!(texts, vec!["Excel", "SQL", "Liderazgo"]);
    }

    fn store() -> Arc<dyn TaxonomyStore> {
        Arc::new(TaxonomySnapshot::new(vec![
            TaxonomyEntry::new("esco:python", "en", "Python").with_skill_type("knowledge"),
            TaxonomyEntry::new("esco:ml", "en", "machine learning"),
        ]))
    }

    #[tokio::test]
    async fn test_cascade_process_matches_pattern_mentions() {
        let pipeline = ExtractionPipeline::build(store(), &ExtractionConfig::default(), None, None)
            .await
            .unwrap();
        let doc = Document::new(Uuid::new_v4(), "Python y Kubernetes");
        let outcome = pipeline.process(&doc).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        let python = &outcome.records[0];
        assert_eq!(python.skill_text, "Python");
        assert_eq!(python.taxonomy_uri.as_deref(), Some("esco:python"));
        assert_eq!(python.match_method, Some(MatchMethod::Exact));
        assert_eq!(python.skill_type.as_deref(), Some("knowledge"));
        assert_eq!(outcome.emergent(), 1);
        assert_eq!(outcome.matching.total, 2);
        assert!(outcome.ngram.is_none());
    }

    #[tokio::test]
    async fn test_ngram_mode_without_index_is_config_error() {
        let matcher = Arc::new(TaxonomyMatcher::new(store(), &ExtractionConfig::default()));
        let pipeline = ExtractionPipeline::new(matcher, EntityExtractor::disabled())
            .with_mode(ExtractionMode::Ngram);
        let err = pipeline
            .process(&Document::new(Uuid::new_v4(), "machine learning"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
