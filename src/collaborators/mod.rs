//! Collaborator Pool
//!
//! Every external dependency sits behind a trait so the pipelines can be
//! driven by mocks in tests. The production implementations are thin HTTP
//! clients plus the Qdrant client; all are cheap to share via `Arc` and
//! are injected once at construction time, never rebuilt per request.

pub mod embedding;
pub mod ocr;
pub mod oracle;
pub mod vector_store;

pub use embedding::{Embedder, OllamaEmbedder};
pub use ocr::{HttpOcrEngine, OcrEngine};
pub use oracle::{ChatOracle, PreFilterVerdict, RelevanceOracle, RelevanceVerdict};
pub use vector_store::{FieldFilter, PointRecord, QdrantStore, VectorStore};

use std::sync::Arc;

/// Read-mostly bundle of shared collaborator handles.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub oracle: Arc<dyn RelevanceOracle>,
    pub ocr: Arc<dyn OcrEngine>,
}
