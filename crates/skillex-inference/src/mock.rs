//! Deterministic backends for testing.
//!
//! ```rust
//! use skillex_core::EmbeddingBackend;
//! use skillex_inference::mock::MockEmbeddingBackend;
//!
//! let backend = MockEmbeddingBackend::new().with_dimension(16);
//! assert_eq!(backend.dimension(), 16);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use skillex_core::{
    EmbeddingBackend, EntityRecognizer, Error, RecognizedSpan, Result, SpanKind, Vector,
};

/// Embedding backend producing deterministic vectors.
///
/// Texts without an explicit vector get a character-hash embedding, so the
/// same text always embeds identically.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fixed: Arc<HashMap<String, Vec<f32>>>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            dimension: 64,
            fixed: Arc::new(HashMap::new()),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Return `vector` whenever `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.fixed).insert(text.into(), vector);
        self
    }

    /// Make every call fail with an embedding error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of `embed_texts` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Character-hash embedding, L2-normalized.
    pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension.max(1)];
        for (i, c) in text.to_lowercase().chars().enumerate() {
            let idx = (c as usize + i) % vec.len();
            vec[idx] += 0.1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Embedding("mock embedding failure".into()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let v = self
                    .fixed
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::hash_embedding(t, self.dimension));
                Vector::from(v)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// Recognizer that reports every case-insensitive occurrence of known terms.
#[derive(Clone, Default)]
pub struct MockRecognizer {
    terms: Vec<(String, SpanKind, String)>,
    fail: bool,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize `term` wherever it occurs.
    pub fn with_term(mut self, term: impl Into<String>, kind: SpanKind, label: &str) -> Self {
        self.terms.push((term.into(), kind, label.to_string()));
        self
    }

    /// Make every call fail with a recognition error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl EntityRecognizer for MockRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedSpan>> {
        if self.fail {
            return Err(Error::Recognition("mock recognizer failure".into()));
        }
        let haystack: Vec<char> = text.chars().collect();
        let lower: Vec<char> = haystack
            .iter()
            .map(|c| c.to_lowercase().next().unwrap_or(*c))
            .collect();

        let mut spans = Vec::new();
        for (term, kind, label) in &self.terms {
            let needle: Vec<char> = term
                .chars()
                .map(|c| c.to_lowercase().next().unwrap_or(c))
                .collect();
            if needle.is_empty() || needle.len() > lower.len() {
                continue;
            }
            for start in 0..=(lower.len() - needle.len()) {
                if lower[start..start + needle.len()] == needle[..] {
                    let end = start + needle.len();
                    spans.push(RecognizedSpan {
                        text: haystack[start..end].iter().collect(),
                        start,
                        end,
                        kind: *kind,
                        label: label.clone(),
                        score: 0.9,
                    });
                }
            }
        }
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }

    fn model_name(&self) -> &str {
        "mock-ner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let backend = MockEmbeddingBackend::new().with_dimension(32);
        let a = backend.embed_texts(&["python".into()]).await.unwrap();
        let b = backend.embed_texts(&["python".into()]).await.unwrap();
        assert_eq!(a[0].as_slice(), b[0].as_slice());
        assert_eq!(a[0].as_slice().len(), 32);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_embedding_fixed_vector() {
        let backend = MockEmbeddingBackend::new().with_vector("k8s", vec![1.0, 0.0]);
        let v = backend.embed_texts(&["k8s".into()]).await.unwrap();
        assert_eq!(v[0].as_slice(), &[1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_embedding_failure() {
        let backend = MockEmbeddingBackend::new().failing();
        assert!(backend.embed_texts(&["x".into()]).await.is_err());
    }

    #[test]
    fn test_hash_embedding_normalized() {
        let v = MockEmbeddingBackend::hash_embedding("terraform", 16);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_recognizer_finds_occurrences() {
        let recognizer = MockRecognizer::new()
            .with_term("kafka", SpanKind::NamedEntity, "technology")
            .with_term("trabajo en equipo", SpanKind::NounPhrase, "skill");
        let spans = recognizer
            .recognize("Kafka, trabajo en equipo y más Kafka")
            .await
            .unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].text, "Kafka");
        assert_eq!((spans[0].start, spans[0].end), (0, 5));
        assert_eq!(spans[1].kind, SpanKind::NounPhrase);
        assert_eq!(spans[2].start, 31);
    }
}
