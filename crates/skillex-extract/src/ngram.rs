//! Exhaustive n-gram lookup against a precomputed taxonomy index.
//!
//! Offline, every preferred label of every active entry is normalized and cut
//! into contiguous word n-grams (1..=max); each n-gram maps to the entries it
//! came from. Online, the document is normalized the same way, all its
//! n-grams are looked up, and the raw hits are reduced by longest-match
//! overlap resolution followed by per-entry deduplication.
//!
//! No statistical model is involved, so results are fully reproducible.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skillex_core::defaults::{NGRAM_CONFIDENCE, NGRAM_MIN_CHARS, NGRAM_MIN_UNIGRAM_CHARS};
use skillex_core::text::{char_slice, normalize, tokens_with_spans};
use skillex_core::{
    blend_confidence, round3, ExtractedSkillRecord, ExtractionMethod, MatchMethod,
    TaxonomyEntry,
};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// One taxonomy label reachable from an n-gram.
#[derive(Debug, Clone, PartialEq)]
struct IndexedLabel {
    uri: String,
    label: String,
    category: Option<String>,
    skill_type: Option<String>,
    ngram_size: usize,
    label_tokens: usize,
}

/// N-gram → taxonomy label index.
#[derive(Debug, Default)]
pub struct NgramIndex {
    map: HashMap<String, Vec<IndexedLabel>>,
    max_size: usize,
    entry_count: usize,
}

impl NgramIndex {
    /// Build the index from taxonomy entries. Inactive entries are skipped.
    pub fn build(entries: &[TaxonomyEntry], max_size: usize) -> Self {
        let started = std::time::Instant::now();
        let max_size = max_size.max(1);
        let mut map: HashMap<String, Vec<IndexedLabel>> = HashMap::new();
        let mut entry_count = 0;

        for entry in entries.iter().filter(|e| e.active) {
            entry_count += 1;
            let mut seen_for_entry = HashSet::new();
            for label in entry.preferred_labels() {
                let tokens: Vec<String> = normalize(label)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if tokens.is_empty() {
                    continue;
                }
                for size in 1..=max_size.min(tokens.len()) {
                    for window in tokens.windows(size) {
                        let gram = window.join(" ");
                        if size == 1 && gram.chars().count() < NGRAM_MIN_UNIGRAM_CHARS {
                            continue;
                        }
                        if !seen_for_entry.insert(gram.clone()) {
                            continue;
                        }
                        map.entry(gram).or_default().push(IndexedLabel {
                            uri: entry.uri.clone(),
                            label: label.to_string(),
                            category: entry.category.clone(),
                            skill_type: entry.skill_type.clone(),
                            ngram_size: size,
                            label_tokens: tokens.len(),
                        });
                    }
                }
            }
        }

        info!(
            subsystem = "extract",
            component = "ngram_index",
            op = "build",
            entry_count,
            ngram_count = map.len(),
            max_size,
            duration_ms = started.elapsed().as_millis() as u64,
            "N-gram index built"
        );
        Self {
            map,
            max_size,
            entry_count,
        }
    }

    /// Number of distinct n-grams indexed.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of active entries indexed.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// URIs of the entries reachable from a normalized n-gram.
    pub fn lookup(&self, ngram: &str) -> Vec<&str> {
        self.map
            .get(ngram)
            .map(|labels| labels.iter().map(|l| l.uri.as_str()).collect())
            .unwrap_or_default()
    }
}

/// An accepted n-gram match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NgramMatch {
    pub uri: String,
    /// Taxonomy label the n-gram came from.
    pub label: String,
    /// Normalized n-gram text.
    pub ngram: String,
    pub category: Option<String>,
    pub skill_type: Option<String>,
    pub ngram_size: usize,
    /// Fraction of the label's tokens covered by the n-gram.
    pub coverage: f64,
    /// First token index (inclusive).
    pub token_start: usize,
    /// Last token index (inclusive).
    pub token_end: usize,
    /// Character span in the original document text.
    pub span_start: usize,
    pub span_end: usize,
    /// Document text covered by the match.
    pub matched_text: String,
}

impl NgramMatch {
    pub fn match_method(&self) -> MatchMethod {
        if self.coverage >= 1.0 {
            MatchMethod::Exact
        } else {
            MatchMethod::Fuzzy
        }
    }

    /// 1.0 for a full-label match, otherwise the coverage.
    pub fn match_confidence(&self) -> f64 {
        if self.coverage >= 1.0 {
            1.0
        } else {
            round3(self.coverage)
        }
    }

    fn overlaps(&self, other: &NgramMatch) -> bool {
        self.token_start <= other.token_end && other.token_start <= self.token_end
    }
}

/// Aggregate numbers for one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NgramMetadata {
    pub raw_matches: usize,
    pub total_matches: usize,
    pub unique_skills: usize,
    /// n-gram size → accepted matches of that size.
    pub size_distribution: BTreeMap<usize, usize>,
    pub mean_ngram_size: f64,
}

/// Result of one n-gram extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NgramExtraction {
    pub matches: Vec<NgramMatch>,
    pub metadata: NgramMetadata,
}

/// Extractor over a shared, immutable [`NgramIndex`].
#[derive(Debug, Clone)]
pub struct NgramExtractor {
    index: Arc<NgramIndex>,
    min_chars: usize,
}

impl NgramExtractor {
    pub fn new(index: Arc<NgramIndex>) -> Self {
        Self {
            index,
            min_chars: NGRAM_MIN_CHARS,
        }
    }

    /// Shortest document n-gram (in characters) looked up.
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn index(&self) -> &NgramIndex {
        &self.index
    }

    /// Extract taxonomy matches from `text`.
    ///
    /// Matches are returned in document order.
    pub fn extract(&self, text: &str) -> NgramExtraction {
        let tokens = tokens_with_spans(text);
        if tokens.is_empty() || self.index.is_empty() {
            return NgramExtraction::default();
        }

        let mut raw = Vec::new();
        for size in 1..=self.index.max_size.min(tokens.len()) {
            for start in 0..=(tokens.len() - size) {
                let window = &tokens[start..start + size];
                let gram = window
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if gram.chars().count() < self.min_chars {
                    continue;
                }
                let Some(labels) = self.index.map.get(&gram) else {
                    continue;
                };
                let span_start = window[0].start;
                let span_end = window[size - 1].end;
                for label in labels {
                    trace!(ngram = %gram, uri = %label.uri, "Raw n-gram hit");
                    raw.push(NgramMatch {
                        uri: label.uri.clone(),
                        label: label.label.clone(),
                        ngram: gram.clone(),
                        category: label.category.clone(),
                        skill_type: label.skill_type.clone(),
                        ngram_size: size,
                        coverage: size as f64 / label.label_tokens as f64,
                        token_start: start,
                        token_end: start + size - 1,
                        span_start,
                        span_end,
                        matched_text: char_slice(text, span_start, span_end),
                    });
                }
            }
        }

        let raw_matches = raw.len();
        let resolved = resolve_overlaps(raw);
        let matches = dedup_by_entry(resolved);
        let metadata = metadata_for(raw_matches, &matches);

        debug!(
            subsystem = "extract",
            component = "ngram",
            raw_matches,
            result_count = matches.len(),
            "N-gram extraction complete"
        );
        NgramExtraction { matches, metadata }
    }

    /// Convert accepted matches into skill records for `document_id`.
    pub fn to_records(&self, document_id: Uuid, matches: &[NgramMatch]) -> Vec<ExtractedSkillRecord> {
        matches
            .iter()
            .map(|m| ExtractedSkillRecord {
                document_id,
                skill_text: m.label.clone(),
                extraction_method: ExtractionMethod::Ngram,
                final_confidence: blend_confidence(NGRAM_CONFIDENCE, Some(m.match_confidence())),
                taxonomy_uri: Some(m.uri.clone()),
                match_method: Some(m.match_method()),
                skill_type: m.skill_type.clone().or_else(|| m.category.clone()),
                span_start: i32::try_from(m.span_start).ok(),
                span_end: i32::try_from(m.span_end).ok(),
            })
            .collect()
    }
}

/// Longest non-overlapping matches win.
///
/// Sorted by size (desc), start (asc); among hits on the same span, full-label
/// coverage first, then URI, so the outcome does not depend on index order.
fn resolve_overlaps(mut raw: Vec<NgramMatch>) -> Vec<NgramMatch> {
    raw.sort_by(|a, b| {
        b.ngram_size
            .cmp(&a.ngram_size)
            .then(a.token_start.cmp(&b.token_start))
            .then(b.coverage.total_cmp(&a.coverage))
            .then(a.uri.cmp(&b.uri))
    });
    let mut accepted: Vec<NgramMatch> = Vec::new();
    for candidate in raw {
        if accepted.iter().all(|a| !a.overlaps(&candidate)) {
            accepted.push(candidate);
        }
    }
    accepted
}

/// Keep one match per taxonomy entry: the one from the largest n-gram.
fn dedup_by_entry(accepted: Vec<NgramMatch>) -> Vec<NgramMatch> {
    // `accepted` is already ordered by size descending.
    let mut seen = HashSet::new();
    let mut unique: Vec<NgramMatch> = accepted
        .into_iter()
        .filter(|m| seen.insert(m.uri.clone()))
        .collect();
    unique.sort_by_key(|m| m.token_start);
    unique
}

fn metadata_for(raw_matches: usize, matches: &[NgramMatch]) -> NgramMetadata {
    let mut size_distribution = BTreeMap::new();
    for m in matches {
        *size_distribution.entry(m.ngram_size).or_insert(0) += 1;
    }
    let mean_ngram_size = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|m| m.ngram_size).sum::<usize>() as f64 / matches.len() as f64
    };
    let unique_skills = matches.iter().map(|m| &m.uri).collect::<HashSet<_>>().len();
    NgramMetadata {
        raw_matches,
        total_matches: matches.len(),
        unique_skills,
        size_distribution,
        mean_ngram_size,
    }
}
