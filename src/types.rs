//! Core data model shared by the query and ingestion pipelines

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which collection supplied an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Knowledge,
    Document,
}

/// An incoming user query. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Caller override for the number of candidates retrieved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Opaque caller-supplied metadata, echoed into logs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
            metadata: None,
        }
    }
}

/// One nearest-neighbor hit from the vector store, consumed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Cosine similarity normalized to [0, 1]
    pub similarity: f32,
    pub payload: Map<String, Value>,
}

impl Candidate {
    /// Text field of the payload, used for lexical overlap and relevance
    /// judgment. Knowledge entries store it under `question_rag_name`,
    /// document chunks under `text`.
    pub fn text(&self) -> &str {
        self.payload
            .get("question_rag_name")
            .or_else(|| self.payload.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Candidate plus the scorer's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub overlap_score: f32,
    pub combined_score: f32,
}

/// One entry of the response envelope. Field names are identical no matter
/// which collection supplied the answer; callers never branch on `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Human-facing title: the curated question, or `[Dokumen] file - page`
    pub title: String,
    pub text: String,
    /// Back-reference into the owning system: answer id or doc id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub similarity: f32,
    pub overlap_score: f32,
    pub combined_score: f32,
}

/// The terminal response envelope returned for every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<ResultEntry>,
    /// Top combined score, 0.0 when nothing was found or the query was
    /// rejected
    pub confidence: f32,
    pub source: Source,
    pub fallback_used: bool,
    pub message: String,
    /// Present only when post-summarization is enabled and succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SearchResult {
    /// Pre-filter declined the query; no vector search was performed.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            confidence: 0.0,
            source: Source::Knowledge,
            fallback_used: false,
            message: reason.into(),
            summary: None,
        }
    }

    /// Degraded terminal state: collaborator failure or both collections
    /// empty. Still a successful response.
    pub fn no_confidence(message: impl Into<String>, fallback_used: bool) -> Self {
        Self {
            results: Vec::new(),
            confidence: 0.0,
            source: Source::Knowledge,
            fallback_used,
            message: message.into(),
            summary: None,
        }
    }
}

/// One ingestion unit. `doc_id` is the idempotency key: re-ingesting the
/// same id replaces its chunks instead of duplicating them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJob {
    pub doc_id: String,
    pub opd_name: String,
    pub category: String,
    pub file_url: String,
}

/// A bounded text segment of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequence index within the document, from original text order
    pub index: usize,
    /// Exact segment; in-order concatenation reconstructs the source text
    /// modulo whitespace
    pub text: String,
    /// What actually gets embedded: `text` with an optional overlap prefix
    /// carried over from the previous chunk
    pub embed_text: String,
}

/// Per-stage wall-clock timings of an ingestion job, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub fetch_sec: f64,
    pub extract_sec: f64,
    pub chunk_sec: f64,
    pub embed_sec: f64,
    pub replace_sec: f64,
    pub total_sec: f64,
}

/// Outcome report of a completed ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub filename: String,
    pub total_pages: usize,
    pub chunks_indexed: usize,
    pub timings: StageTimings,
}
