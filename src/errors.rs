//! Error types for the ragserve backend
//!
//! Two outcomes that look like errors are deliberately *not* here: a query
//! rejected by the pre-filter and a search where nothing clears the
//! confidence threshold. Both are terminal success states carried inside
//! `SearchResult` with zero/low confidence.

use thiserror::Error;

/// Ingestion stage identifiers, reported with every ingestion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Fetch,
    Extract,
    Chunk,
    Embed,
    Replace,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IngestStage::Fetch => "fetch",
            IngestStage::Extract => "extract",
            IngestStage::Chunk => "chunk",
            IngestStage::Embed => "embed",
            IngestStage::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// Main error type for the RAG service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// An external collaborator (embedding model, vector store, relevance
    /// oracle, OCR engine) is unreachable or returned an error
    #[error("Collaborator '{name}' unavailable: {message}")]
    Collaborator { name: &'static str, message: String },

    /// An ingestion step failed; the step is named so the caller can see
    /// where the job stopped
    #[error("Ingestion of '{doc_id}' failed at stage '{stage}': {message}")]
    Ingestion {
        doc_id: String,
        stage: IngestStage,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Shorthand used by collaborator clients.
    pub fn collaborator(name: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Collaborator {
            name,
            message: message.into(),
        }
    }
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
