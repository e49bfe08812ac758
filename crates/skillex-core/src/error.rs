//! Error types for skillex.

use thiserror::Error;

/// Result type alias using skillex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for skillex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found in the backlog or posting store
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Taxonomy lookup or snapshot construction failed
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Entity recognition model failed
    #[error("Recognition error: {0}")]
    Recognition(String),

    /// Skill extraction for a document failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Backlog claim failed
    #[error("Claim error: {0}")]
    Claim(String),

    /// Operation exceeded its time bound
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
