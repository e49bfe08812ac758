//! Statistical entity extraction filtered by technical-skill heuristics.
//!
//! Named entities and noun phrases come from an [`EntityRecognizer`]. Only
//! candidates that look like a technical skill survive: an indicator keyword
//! ("framework", "library", "herramienta", ...), or a surface form typical of
//! tech names (CamelCase, ALL-CAPS, `.js`/`.net`-style suffixes, letters mixed
//! with digits or `+`/`#`).
//!
//! Without a recognizer the extractor is disabled and yields nothing.

use std::collections::HashSet;
use std::sync::Arc;

use skillex_core::defaults::{
    CONTEXT_WINDOW_CHARS, ENTITY_MAX_WORDS, MIN_MENTION_CHARS, NAMED_ENTITY_CONFIDENCE,
    NOUN_PHRASE_CONFIDENCE,
};
use skillex_core::text::{char_len, context_window, mention_key};
use skillex_core::{
    CandidateSkillMention, EntityRecognizer, ExtractionMethod, Result, SpanKind,
};
use tracing::{debug, trace};
use uuid::Uuid;

const INDICATOR_KEYWORDS: &[&str] = &[
    "framework",
    "frameworks",
    "library",
    "libraries",
    "librería",
    "librerías",
    "biblioteca",
    "tool",
    "tools",
    "herramienta",
    "herramientas",
    "platform",
    "plataforma",
    "language",
    "lenguaje",
    "programming",
    "programación",
    "software",
    "database",
    "databases",
    "cloud",
    "api",
    "apis",
    "sdk",
    "stack",
    "engine",
    "server",
    "servidor",
];

const TECH_SUFFIXES: &[&str] = &[".js", ".net", ".io", ".py", "sql", "db", "ops", "script", "ql"];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "in", "on", "for", "with", "to", "or", "el", "la", "los",
    "las", "un", "una", "de", "del", "en", "y", "o", "con", "para", "por", "que", "se", "al",
];

/// Whether `candidate` looks like a technical skill.
///
/// ```
/// use skillex_extract::looks_like_skill;
/// assert!(looks_like_skill("PostgreSQL"));
/// assert!(looks_like_skill("HTML5"));
/// assert!(looks_like_skill("testing framework"));
/// assert!(!looks_like_skill("Madrid"));
/// ```
pub fn looks_like_skill(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if char_len(trimmed) < MIN_MENTION_CHARS {
        return false;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.is_empty() || words.len() > ENTITY_MAX_WORDS {
        return false;
    }
    let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    if lower.iter().all(|w| STOPWORDS.contains(&w.as_str())) {
        return false;
    }

    if lower.iter().any(|w| INDICATOR_KEYWORDS.contains(&w.as_str())) {
        return true;
    }
    words.iter().any(|w| surface_looks_technical(w))
}

fn surface_looks_technical(word: &str) -> bool {
    let lower = word.to_lowercase();
    if TECH_SUFFIXES
        .iter()
        .any(|s| lower.len() > s.len() && lower.ends_with(s))
    {
        return true;
    }
    if word.contains('+') || word.contains('#') {
        return true;
    }

    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase()) {
        return true;
    }
    let has_digit = word.chars().any(|c| c.is_ascii_digit());
    if has_digit && !letters.is_empty() {
        return true;
    }
    // CamelCase: an uppercase letter right after a lowercase one.
    word.chars()
        .zip(word.chars().skip(1))
        .any(|(a, b)| a.is_lowercase() && b.is_uppercase())
}

/// Extractor backed by an optional statistical recognizer.
#[derive(Clone)]
pub struct EntityExtractor {
    recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl EntityExtractor {
    pub fn new(recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            recognizer: Some(recognizer),
        }
    }

    /// Extractor with no model; always returns no mentions.
    pub fn disabled() -> Self {
        Self { recognizer: None }
    }

    pub fn from_option(recognizer: Option<Arc<dyn EntityRecognizer>>) -> Self {
        Self { recognizer }
    }

    pub fn is_enabled(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Recognize, filter, and deduplicate candidate mentions.
    ///
    /// Recognizer errors propagate: the caller fails the document rather than
    /// persisting a silently partial result.
    pub async fn extract(
        &self,
        document_id: Uuid,
        text: &str,
    ) -> Result<Vec<CandidateSkillMention>> {
        let Some(recognizer) = &self.recognizer else {
            return Ok(Vec::new());
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let spans = recognizer.recognize(text).await?;
        let total = spans.len();
        let mut seen = HashSet::new();
        let mut mentions = Vec::new();

        for span in spans {
            if !looks_like_skill(&span.text) {
                trace!(candidate = %span.text, label = %span.label, "Entity candidate rejected");
                continue;
            }
            if !seen.insert(mention_key(&span.text)) {
                continue;
            }
            let confidence = match span.kind {
                SpanKind::NamedEntity => NAMED_ENTITY_CONFIDENCE,
                SpanKind::NounPhrase => NOUN_PHRASE_CONFIDENCE,
            };
            mentions.push(CandidateSkillMention {
                context: context_window(text, span.start, span.end, CONTEXT_WINDOW_CHARS),
                text: span.text.trim().to_string(),
                category: span.label.to_lowercase(),
                method: ExtractionMethod::Entity,
                confidence,
                document_id,
                span_start: span.start,
                span_end: span.end,
            });
        }

        debug!(
            subsystem = "extract",
            component = "entity",
            model = recognizer.model_name(),
            candidates = total,
            result_count = mentions.len(),
            "Entity extraction complete"
        );
        Ok(mentions)
    }
}
