//! Rule-based extraction of known technical terms.
//!
//! The table is grouped by category; every entry is a case-insensitive
//! regular expression. A hit only counts when the characters on either side
//! are not alphanumeric, so `Java` never fires inside `JavaScript` while
//! symbol-terminated terms (`C++`, `C#`, `.NET`) still match. Single-letter
//! languages (C, R) and common words (Go, Spring, Express) are deliberately
//! absent or only matched in an unambiguous form.

use once_cell::sync::Lazy;
use regex::Regex;
use skillex_core::defaults::{CONTEXT_WINDOW_CHARS, PATTERN_CONFIDENCE};
use skillex_core::text::{context_window, mention_key};
use skillex_core::{CandidateSkillMention, ExtractionMethod};
use std::collections::HashSet;
use tracing::{trace, warn};
use uuid::Uuid;

/// Category → pattern sources.
const PATTERN_TABLE: &[(&str, &[&str])] = &[
    (
        "programming_language",
        &[
            r"python",
            r"java",
            r"javascript",
            r"typescript",
            r"c\+\+",
            r"c#",
            r"golang",
            r"rust",
            r"ruby",
            r"php",
            r"kotlin",
            r"swift",
            r"scala",
            r"perl",
            r"matlab",
            r"bash",
            r"powershell",
            r"objective-c",
            r"dart",
            r"elixir",
            r"haskell",
            r"visual basic",
            r"vb\.net",
            r"cobol",
            r"fortran",
            r"lua",
            r"groovy",
            r"pl/sql",
        ],
    ),
    (
        "framework",
        &[
            r"react(?:\.js|js)?",
            r"react native",
            r"angular(?:js)?",
            r"vue(?:\.js|js)?",
            r"django",
            r"flask",
            r"fastapi",
            r"spring boot",
            r"spring framework",
            r"express\.js|expressjs",
            r"node\.?js",
            r"\.net(?: core)?",
            r"asp\.net(?: core)?",
            r"laravel",
            r"ruby on rails",
            r"next\.js|nextjs",
            r"nuxt(?:\.js)?",
            r"svelte",
            r"symfony",
            r"jquery",
            r"bootstrap",
            r"tailwind(?: css)?",
            r"hibernate",
            r"flutter",
        ],
    ),
    (
        "database",
        &[
            r"sql",
            r"mysql",
            r"postgres(?:ql)?",
            r"mongodb",
            r"redis",
            r"oracle",
            r"sql server",
            r"sqlite",
            r"cassandra",
            r"elasticsearch",
            r"dynamodb",
            r"mariadb",
            r"nosql",
            r"neo4j",
            r"firebase",
        ],
    ),
    (
        "cloud",
        &[
            r"aws",
            r"amazon web services",
            r"azure",
            r"gcp",
            r"google cloud(?: platform)?",
            r"heroku",
            r"digitalocean",
            r"openshift",
            r"ec2",
            r"s3",
        ],
    ),
    (
        "devops",
        &[
            r"docker",
            r"kubernetes",
            r"k8s",
            r"jenkins",
            r"terraform",
            r"ansible",
            r"ci/cd",
            r"gitlab ci",
            r"github actions",
            r"circleci",
            r"prometheus",
            r"grafana",
            r"helm",
            r"puppet",
            r"nginx",
            r"linux",
            r"devops",
        ],
    ),
    (
        "version_control",
        &[
            r"git",
            r"github",
            r"gitlab",
            r"bitbucket",
            r"svn",
            r"subversion",
            r"mercurial",
        ],
    ),
    (
        "data_science",
        &[
            r"pandas",
            r"numpy",
            r"scikit-learn",
            r"sklearn",
            r"tensorflow",
            r"pytorch",
            r"keras",
            r"(?:apache )?spark|pyspark",
            r"hadoop",
            r"tableau",
            r"power bi",
            r"machine learning",
            r"deep learning",
            r"nlp",
            r"jupyter",
            r"matplotlib",
            r"airflow",
            r"databricks",
            r"etl",
        ],
    ),
    (
        "web",
        &[
            r"html5?",
            r"css3?",
            r"sass",
            r"restful(?: apis?)?|rest apis?",
            r"graphql",
            r"json",
            r"xml",
            r"webpack",
            r"ajax",
            r"soap",
            r"microservices?",
        ],
    ),
];

struct CompiledPattern {
    category: &'static str,
    regex: Regex,
}

static COMPILED: Lazy<Vec<CompiledPattern>> = Lazy::new(|| {
    PATTERN_TABLE
        .iter()
        .flat_map(|(category, sources)| sources.iter().map(move |src| (*category, *src)))
        .filter_map(|(category, src)| match Regex::new(&format!("(?i){}", src)) {
            Ok(regex) => Some(CompiledPattern { category, regex }),
            Err(e) => {
                warn!(
                    subsystem = "extract",
                    component = "pattern",
                    pattern = src,
                    error = %e,
                    "Skipping invalid skill pattern"
                );
                None
            }
        })
        .collect()
});

/// One raw hit, in character offsets.
struct Hit {
    start: usize,
    end: usize,
    category: &'static str,
}

/// Rule-based extractor over the curated pattern table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Number of compiled patterns.
    pub fn pattern_count(&self) -> usize {
        COMPILED.len()
    }

    /// Categories in table order.
    pub fn categories(&self) -> Vec<&'static str> {
        PATTERN_TABLE.iter().map(|(c, _)| *c).collect()
    }

    /// Extract pattern mentions from `text`.
    ///
    /// Overlapping hits keep the longest one ("React Native" over "React").
    /// Output is deduplicated by lowercased, trimmed text, keeping the first
    /// occurrence, and ordered by position.
    pub fn extract(&self, document_id: Uuid, text: &str) -> Vec<CandidateSkillMention> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let byte_to_char = ByteToChar::new(text);
        let mut hits = Vec::new();

        for pattern in COMPILED.iter() {
            for m in pattern.regex.find_iter(text) {
                let start = byte_to_char.get(m.start());
                let end = byte_to_char.get(m.end());
                if start == end || !on_boundary(&chars, start, end) {
                    continue;
                }
                hits.push(Hit {
                    start,
                    end,
                    category: pattern.category,
                });
            }
        }

        // Longest first, then leftmost; accept spans that do not overlap.
        hits.sort_by(|a, b| {
            (b.end - b.start)
                .cmp(&(a.end - a.start))
                .then(a.start.cmp(&b.start))
        });
        let mut accepted: Vec<Hit> = Vec::new();
        for hit in hits {
            if accepted
                .iter()
                .all(|a| hit.end <= a.start || hit.start >= a.end)
            {
                accepted.push(hit);
            }
        }
        accepted.sort_by_key(|h| h.start);

        let mut seen = HashSet::new();
        let mut mentions = Vec::new();
        for hit in accepted {
            let surface: String = chars[hit.start..hit.end].iter().collect();
            if !seen.insert(mention_key(&surface)) {
                continue;
            }
            trace!(mention = %surface, category = hit.category, "Pattern hit");
            mentions.push(CandidateSkillMention {
                context: context_window(text, hit.start, hit.end, CONTEXT_WINDOW_CHARS),
                text: surface.trim().to_string(),
                category: hit.category.to_string(),
                method: ExtractionMethod::Pattern,
                confidence: PATTERN_CONFIDENCE,
                document_id,
                span_start: hit.start,
                span_end: hit.end,
            });
        }
        mentions
    }
}

/// Neither neighbour of `[start, end)` is alphanumeric.
fn on_boundary(chars: &[char], start: usize, end: usize) -> bool {
    let before_ok = start == 0 || !chars[start - 1].is_alphanumeric();
    let after_ok = end >= chars.len() || !chars[end].is_alphanumeric();
    before_ok && after_ok
}

/// Byte offset → char offset lookup for one text.
struct ByteToChar {
    offsets: Vec<usize>,
}

impl ByteToChar {
    fn new(text: &str) -> Self {
        Self {
            offsets: text.char_indices().map(|(b, _)| b).collect(),
        }
    }

    fn get(&self, byte: usize) -> usize {
        match self.offsets.binary_search(&byte) {
            Ok(idx) => idx,
            Err(idx) => idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(mentions: &[CandidateSkillMention]) -> Vec<String> {
        mentions.iter().map(|m| m.text.clone()).collect()
    }

    #[test]
    fn test_all_patterns_compile() {
        let declared: usize = PATTERN_TABLE.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(PatternExtractor::new().pattern_count(), declared);
    }

    #[test]
    fn test_extracts_spanish_sentence() {
        let text = "Se requiere experiencia en Python y AWS";
        let mentions = PatternExtractor::new().extract(Uuid::nil(), text);
        assert_eq!(texts(&mentions), vec!["Python", "AWS"]);
        assert_eq!(mentions[0].category, "programming_language");
        assert_eq!(mentions[1].category, "cloud");
        assert!(mentions.iter().all(|m| m.confidence == 0.8));
        assert!(mentions.iter().all(|m| m.method == ExtractionMethod::Pattern));
        assert_eq!((mentions[0].span_start, mentions[0].span_end), (27, 33));
    }

    #[test]
    fn test_case_insensitive_dedup_keeps_first() {
        let text = "python, PYTHON and Python";
        let mentions = PatternExtractor::new().extract(Uuid::nil(), text);
        assert_eq!(texts(&mentions), vec!["python"]);
    }

    #[test]
    fn test_word_boundaries() {
        let mentions = PatternExtractor::new().extract(Uuid::nil(), "JavaScript and MySQL");
        assert_eq!(texts(&mentions), vec!["JavaScript", "MySQL"]);
    }

    #[test]
    fn test_symbol_terms() {
        let mentions = PatternExtractor::new().extract(Uuid::nil(), "C++, C# y .NET Core");
        assert_eq!(texts(&mentions), vec!["C++", "C#", ".NET Core"]);
    }

    #[test]
    fn test_longest_overlap_wins() {
        let mentions =
            PatternExtractor::new().extract(Uuid::nil(), "Mobile apps with React Native");
        assert_eq!(texts(&mentions), vec!["React Native"]);
        assert_eq!(mentions[0].category, "framework");
    }

    #[test]
    fn test_context_window() {
        let text = format!("{}Docker{}", "x ".repeat(40), " y".repeat(40));
        let mentions = PatternExtractor::new().extract(Uuid::nil(), &text);
        assert_eq!(mentions.len(), 1);
        let ctx = &mentions[0].context;
        assert!(ctx.contains("Docker"));
        assert!(ctx.chars().count() <= 6 + 2 * CONTEXT_WINDOW_CHARS);
    }

    #[test]
    fn test_spans_are_char_offsets() {
        let text = "Diseño ágil con Kubernetes";
        let mentions = PatternExtractor::new().extract(Uuid::nil(), text);
        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        let slice: String = text.chars().skip(m.span_start).take(m.span_end - m.span_start).collect();
        assert_eq!(slice, "Kubernetes");
    }

    #[test]
    fn test_empty_input() {
        assert!(PatternExtractor::new().extract(Uuid::nil(), "").is_empty());
        assert!(PatternExtractor::new().extract(Uuid::nil(), "   \n").is_empty());
    }

    #[test]
    fn test_no_false_positive_on_plain_words() {
        let mentions = PatternExtractor::new()
            .extract(Uuid::nil(), "Buscamos una persona proactiva para el resto del equipo");
        assert!(mentions.is_empty(), "unexpected: {:?}", texts(&mentions));
    }
}
