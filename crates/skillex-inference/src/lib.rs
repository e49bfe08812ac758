//! # skillex-inference
//!
//! Model backends used by skillex:
//!
//! - [`OllamaEmbedder`]: label and mention embeddings for the semantic match layer
//! - [`GlinerRecognizer`]: zero-shot entity recognition for the entity extractor
//! - [`mock`]: deterministic stand-ins for tests

pub mod gliner;
pub mod mock;
pub mod ollama;

pub use gliner::GlinerRecognizer;
pub use mock::{MockEmbeddingBackend, MockRecognizer};
pub use ollama::OllamaEmbedder;
