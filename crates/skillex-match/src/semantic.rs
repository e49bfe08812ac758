//! Layer 3: embedding nearest neighbour over every taxonomy label.
//!
//! Labels are embedded once when the index is built; queries embed the
//! mention, scan the index by cosine similarity, and accept the best
//! neighbour when it clears the threshold and passes the
//! [`DomainSanityFilter`].

use std::sync::Arc;

use async_trait::async_trait;
use skillex_core::defaults::{
    EMBED_BATCH_SIZE, MIN_TOKEN_CHARS, SEMANTIC_LENGTH_RATIO_FLOOR, SEMANTIC_THRESHOLD,
    SEMANTIC_TOP_K,
};
use skillex_core::text::{char_len, tokenize};
use skillex_core::{
    round3, EmbeddingBackend, Error, MatchMethod, Result, TaxonomyEntry, TaxonomyMatchResult,
    TaxonomyStore,
};
use tracing::{debug, info};

use crate::cascade::MatchLayer;
use crate::fuzzy::MAX_INEXACT_CONFIDENCE;

const TECH_KEYWORDS: &[&str] = &[
    "python",
    "java",
    "script",
    "data",
    "code",
    "dev",
    "software",
    "system",
    "cloud",
    "api",
    "web",
    "mobile",
    "database",
    "server",
    "network",
    "machine",
    "learning",
    "ai",
    "ml",
    "framework",
    "library",
    "tool",
    "devops",
    "infrastructure",
    "engineer",
];

/// Rejects semantically-close but implausible cross-domain pairs.
///
/// A neighbour is rejected when the mention and label share no token, their
/// lengths differ extremely (shorter/longer below the floor), and exactly one
/// of them mentions a technical-domain keyword. This is a heuristic policy:
/// swap the keyword list or floor to tune it.
#[derive(Debug, Clone)]
pub struct DomainSanityFilter {
    keywords: Vec<String>,
    length_ratio_floor: f64,
}

impl Default for DomainSanityFilter {
    fn default() -> Self {
        Self::new(
            TECH_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            SEMANTIC_LENGTH_RATIO_FLOOR,
        )
    }
}

impl DomainSanityFilter {
    pub fn new(keywords: Vec<String>, length_ratio_floor: f64) -> Self {
        Self {
            keywords,
            length_ratio_floor,
        }
    }

    pub fn accepts(&self, mention: &str, label: &str) -> bool {
        let mention_tokens = significant_tokens(mention);
        let label_tokens = significant_tokens(label);
        if mention_tokens.iter().any(|t| label_tokens.contains(t)) {
            return true;
        }

        let (a, b) = (char_len(mention.trim()), char_len(label.trim()));
        let longer = a.max(b);
        if longer == 0 {
            return true;
        }
        let length_ratio = a.min(b) as f64 / longer as f64;
        let extreme_length = length_ratio < self.length_ratio_floor;
        let domain_mismatch =
            self.mentions_keyword(&mention_tokens) != self.mentions_keyword(&label_tokens);

        !(extreme_length && domain_mismatch)
    }

    /// Keywords match whole tokens; keywords of four or more characters also
    /// match inside a token ("javascript" contains "script").
    fn mentions_keyword(&self, tokens: &[String]) -> bool {
        tokens.iter().any(|token| {
            self.keywords
                .iter()
                .any(|k| token == k || (k.len() >= 4 && token.contains(k.as_str())))
        })
    }
}

fn significant_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedLabel {
    entry: usize,
    label: String,
}

/// A neighbour returned by [`SemanticIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour<'a> {
    pub entry: &'a TaxonomyEntry,
    pub label: &'a str,
    pub score: f64,
}

/// Exact cosine index over L2-normalized label embeddings.
#[derive(Debug, Default)]
pub struct SemanticIndex {
    entries: Vec<TaxonomyEntry>,
    labels: Vec<IndexedLabel>,
    vectors: Vec<Vec<f32>>,
}

impl SemanticIndex {
    /// Embed every label of every active entry.
    pub async fn build(entries: &[TaxonomyEntry], backend: &dyn EmbeddingBackend) -> Result<Self> {
        let started = std::time::Instant::now();
        let entries: Vec<TaxonomyEntry> = entries.iter().filter(|e| e.active).cloned().collect();
        let labels: Vec<IndexedLabel> = entries
            .iter()
            .enumerate()
            .flat_map(|(idx, e)| {
                e.all_labels().map(move |l| IndexedLabel {
                    entry: idx,
                    label: l.to_string(),
                })
            })
            .collect();

        let mut vectors = Vec::with_capacity(labels.len());
        for chunk in labels.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|l| l.label.clone()).collect();
            let embedded = backend.embed_texts(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded.iter().map(|v| l2_normalize(v.as_slice())));
        }

        info!(
            subsystem = "match",
            component = "semantic_index",
            op = "build",
            entry_count = entries.len(),
            label_count = labels.len(),
            model = backend.model_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Semantic index built"
        );
        Ok(Self {
            entries,
            labels,
            vectors,
        })
    }

    /// Number of indexed labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Top `k` labels by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbour<'_>> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let query = l2_normalize(query);
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx, dot(&query, v)))
            .collect();

        let by_score = |a: &(usize, f64), b: &(usize, f64)| {
            b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
        };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_score);
            scored.truncate(k);
        }
        scored.sort_by(by_score);

        scored
            .into_iter()
            .map(|(idx, score)| {
                let item = &self.labels[idx];
                Neighbour {
                    entry: &self.entries[item.entry],
                    label: item.label.as_str(),
                    score,
                }
            })
            .collect()
    }
}

fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Semantic match layer over a prebuilt [`SemanticIndex`].
pub struct SemanticLayer {
    index: Arc<SemanticIndex>,
    backend: Arc<dyn EmbeddingBackend>,
    threshold: f64,
    top_k: usize,
    filter: DomainSanityFilter,
}

impl SemanticLayer {
    pub fn new(index: Arc<SemanticIndex>, backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            index,
            backend,
            threshold: SEMANTIC_THRESHOLD,
            top_k: SEMANTIC_TOP_K,
            filter: DomainSanityFilter::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_filter(mut self, filter: DomainSanityFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[async_trait]
impl MatchLayer for SemanticLayer {
    fn method(&self) -> MatchMethod {
        MatchMethod::Semantic
    }

    async fn attempt(
        &self,
        mention: &str,
        _store: &dyn TaxonomyStore,
    ) -> Result<Option<TaxonomyMatchResult>> {
        let mention = mention.trim();
        let embedded = self.backend.embed_texts(&[mention.to_string()]).await?;
        let query = embedded
            .first()
            .ok_or_else(|| Error::Embedding("no embedding returned for mention".into()))?;

        let neighbours = self.index.search(query.as_slice(), self.top_k);
        let Some(best) = neighbours.first() else {
            return Ok(None);
        };
        if best.score < self.threshold {
            return Ok(None);
        }
        if !self.filter.accepts(mention, best.label) {
            debug!(
                mention,
                label = best.label,
                score = best.score,
                "Semantic neighbour rejected by sanity filter"
            );
            return Ok(None);
        }
        Ok(Some(TaxonomyMatchResult::new(
            mention,
            best.entry,
            best.label,
            round3(best.score).min(MAX_INEXACT_CONFIDENCE),
            MatchMethod::Semantic,
        )))
    }
}
