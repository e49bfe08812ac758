//! GLiNER entity recognizer.
//!
//! GLiNER is a zero-shot NER model served by a small HTTP sidecar. The
//! recognizer asks it for technology-flavoured entity types and maps the
//! returned spans onto [`RecognizedSpan`]s.
//!
//! # Configuration
//!
//! - `GLINER_BASE_URL`: base URL of the sidecar. Unset or empty disables
//!   entity extraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skillex_core::defaults::{RECOGNIZER_THRESHOLD, RECOGNIZER_TIMEOUT_SECS};
use skillex_core::{EntityRecognizer, Error, RecognizedSpan, Result, SpanKind};
use tracing::{debug, instrument};

/// Entity types requested from the model.
pub const DEFAULT_ENTITY_TYPES: &[&str] = &[
    "programming language",
    "framework",
    "software tool",
    "technology",
    "platform",
    "skill",
    "competency",
];

/// Labels treated as noun phrases; everything else is a named entity.
const NOUN_PHRASE_LABELS: &[&str] = &["skill", "competency"];

/// A named entity extracted by GLiNER.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NerEntity {
    /// The entity text as it appears in the source.
    pub text: String,
    /// The entity type label.
    pub label: String,
    /// Confidence score from the NER model (0.0-1.0).
    pub score: f32,
    /// Character start offset in the source text.
    pub start: usize,
    /// Character end offset in the source text.
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NerResult {
    entities: Vec<NerEntity>,
    #[serde(default)]
    model: String,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    entity_types: &'a [String],
    threshold: f32,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// GLiNER sidecar client.
pub struct GlinerRecognizer {
    base_url: String,
    client: reqwest::Client,
    entity_types: Vec<String>,
    threshold: f32,
    timeout_secs: u64,
}

impl GlinerRecognizer {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            entity_types: DEFAULT_ENTITY_TYPES.iter().map(|s| s.to_string()).collect(),
            threshold: RECOGNIZER_THRESHOLD,
            timeout_secs: RECOGNIZER_TIMEOUT_SECS,
        }
    }

    /// Create from `GLINER_BASE_URL`. Returns None when unset or empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GLINER_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return None;
        }
        Some(Self::new(base_url))
    }

    pub fn with_entity_types(mut self, types: Vec<String>) -> Self {
        self.entity_types = types;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Whether the sidecar reports itself healthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "healthy")
                .unwrap_or(false),
            _ => false,
        }
    }
}

fn span_kind(label: &str) -> SpanKind {
    if NOUN_PHRASE_LABELS.contains(&label.to_lowercase().as_str()) {
        SpanKind::NounPhrase
    } else {
        SpanKind::NamedEntity
    }
}

#[async_trait]
impl EntityRecognizer for GlinerRecognizer {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "gliner", op = "recognize", text_len = text.len()))]
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>> {
        let url = format!("{}/extract", self.base_url);
        let request = ExtractRequest {
            text,
            entity_types: &self.entity_types,
            threshold: self.threshold,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("GLiNER request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!(
                "GLiNER API returned {}: {}",
                status, body
            )));
        }

        let result: NerResult = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("Failed to parse GLiNER response: {}", e)))?;

        debug!(
            model = %result.model,
            result_count = result.entities.len(),
            "GLiNER recognition complete"
        );
        Ok(result
            .entities
            .into_iter()
            .filter(|e| e.end > e.start)
            .map(|e| RecognizedSpan {
                kind: span_kind(&e.label),
                text: e.text,
                start: e.start,
                end: e.end,
                label: e.label,
                score: e.score,
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "gliner"
    }
}
