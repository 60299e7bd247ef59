//! ragserve - Retrieval-augmented answering backend for a public-service
//! knowledge base
//!
//! Two pipelines over two Qdrant collections:
//!
//! - **Query resolution**: pre-filter, vector search over curated
//!   question/answer entries, relevance check, blended scoring, and a
//!   confidence-gated fallback into OCR-extracted document chunks.
//! - **Document ingestion**: fetch, OCR extraction, chunking, embedding,
//!   and idempotent replacement keyed by document id.
//!
//! External collaborators (embedding model, vector store, relevance
//! oracle, OCR engine) sit behind traits in [`collaborators`].

pub mod errors;
pub mod types;
pub mod config;

pub mod collaborators;
pub mod query;
pub mod ingest;
pub mod knowledge;

// Re-export commonly used types
pub use errors::{Result, ServiceError};
