//! Shared mock collaborators for the pipeline integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ragserve::collaborators::{
    Collaborators, Embedder, FieldFilter, OcrEngine, PointRecord, PreFilterVerdict,
    RelevanceOracle, RelevanceVerdict, VectorStore,
};
use ragserve::errors::{Result, ServiceError};
use ragserve::types::Candidate;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Deterministic embedder; records every prompt it was given.
#[derive(Default)]
pub struct MockEmbedder {
    pub prompts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::collaborator("embedding", "model offline"));
        }
        self.prompts.lock().unwrap().push(text.to_string());
        Ok(vec![0.1, 0.2, 0.3, 0.4])
    }
}

fn payload_matches(point: &PointRecord, filter: &FieldFilter) -> bool {
    point
        .payload
        .get(&filter.key)
        .and_then(Value::as_str)
        .map(|v| v == filter.value)
        .unwrap_or(false)
}

/// In-memory vector store: canned search results per collection, live
/// point state for the delete/upsert paths, an operation log, and a
/// configurable upsert failure point.
#[derive(Default)]
pub struct MockVectorStore {
    pub knowledge_hits: Mutex<Vec<Candidate>>,
    pub document_hits: Mutex<Vec<Candidate>>,
    /// One line per call, in call order
    pub ops: Mutex<Vec<String>>,
    /// Current contents of the store, upserts and deletes applied
    pub points: Mutex<Vec<PointRecord>>,
    pub deleted_ids: Mutex<Vec<String>>,
    /// Which upsert call fails, 1-based; calls before it succeed
    pub fail_upsert_call: Mutex<Option<usize>>,
    /// Artificial latency per upsert, to give concurrent jobs a chance
    /// to interleave if nothing stops them
    pub upsert_delay_ms: u64,
    pub upsert_calls: AtomicUsize,
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_collection(&self, collection: &str, _dim: u64) -> Result<()> {
        self.ops.lock().unwrap().push(format!("ensure:{collection}"));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        limit: usize,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<Candidate>> {
        let filter_desc = filter
            .map(|f| format!("{}={}", f.key, f.value))
            .unwrap_or_else(|| "none".to_string());
        self.ops
            .lock()
            .unwrap()
            .push(format!("search:{collection}:{limit}:{filter_desc}"));

        let hits = if collection.contains("knowledge") {
            self.knowledge_hits.lock().unwrap().clone()
        } else {
            self.document_hits.lock().unwrap().clone()
        };
        Ok(hits.into_iter().take(limit).collect())
    }

    async fn upsert(&self, collection: &str, batch: Vec<PointRecord>) -> Result<()> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_upsert_call.lock().unwrap() == Some(call) {
            return Err(ServiceError::collaborator("qdrant", "upsert refused"));
        }
        if self.upsert_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.upsert_delay_ms)).await;
        }
        self.ops
            .lock()
            .unwrap()
            .push(format!("upsert:{collection}:{}", batch.len()));

        let mut points = self.points.lock().unwrap();
        for incoming in batch {
            match points.iter_mut().find(|p| p.id == incoming.id) {
                Some(existing) => *existing = incoming,
                None => points.push(incoming),
            }
        }
        Ok(())
    }

    async fn delete_by_field(&self, collection: &str, filter: FieldFilter) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("delete_by_field:{collection}:{}={}", filter.key, filter.value));
        self.points
            .lock()
            .unwrap()
            .retain(|p| !payload_matches(p, &filter));
        Ok(())
    }

    async fn delete_by_field_except(
        &self,
        collection: &str,
        filter: FieldFilter,
        unless: FieldFilter,
    ) -> Result<()> {
        self.ops.lock().unwrap().push(format!(
            "delete_stale:{collection}:{}={}:keep:{}={}",
            filter.key, filter.value, unless.key, unless.value
        ));
        self.points
            .lock()
            .unwrap()
            .retain(|p| !payload_matches(p, &filter) || payload_matches(p, &unless));
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ops
            .lock()
            .unwrap()
            .push(format!("delete_points:{collection}:{}", ids.len()));
        self.points.lock().unwrap().retain(|p| !ids.contains(&p.id));
        self.deleted_ids.lock().unwrap().extend(ids);
        Ok(())
    }
}

/// Scripted oracle with per-call failure toggles.
pub struct MockOracle {
    pub valid: bool,
    pub clean_question: String,
    pub relevant: bool,
    pub summary: String,
    pub fail_reformulate: bool,
    pub fail_judge: bool,
    pub judge_calls: AtomicUsize,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            valid: true,
            clean_question: String::new(),
            relevant: true,
            summary: "Ringkasan dokumen.".to_string(),
            fail_reformulate: false,
            fail_judge: false,
            judge_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RelevanceOracle for MockOracle {
    async fn reformulate(&self, question: &str) -> Result<PreFilterVerdict> {
        if self.fail_reformulate {
            return Err(ServiceError::collaborator("oracle", "timeout"));
        }
        let clean = if self.clean_question.is_empty() {
            question.to_string()
        } else {
            self.clean_question.clone()
        };
        Ok(PreFilterVerdict {
            valid: self.valid,
            reason: if self.valid {
                String::new()
            } else {
                "Di luar cakupan".to_string()
            },
            clean_question: clean,
        })
    }

    async fn judge(&self, _question: &str, _candidate_text: &str) -> Result<RelevanceVerdict> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_judge {
            return Err(ServiceError::collaborator("oracle", "timeout"));
        }
        Ok(RelevanceVerdict {
            relevant: self.relevant,
            reason: String::new(),
            reformulated_question: String::new(),
        })
    }

    async fn summarize(&self, _texts: &[String], _max_sentences: usize) -> Result<String> {
        Ok(self.summary.clone())
    }
}

/// Fixed page set; never looks at the bytes.
#[derive(Default)]
pub struct MockOcr {
    pub pages: Vec<String>,
    pub fail: bool,
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn extract(&self, _content: Bytes, _filename: &str, _lang: &str) -> Result<Vec<String>> {
        if self.fail {
            return Err(ServiceError::collaborator("ocr", "engine crashed"));
        }
        Ok(self.pages.clone())
    }
}

pub fn collaborators(
    embedder: Arc<MockEmbedder>,
    store: Arc<MockVectorStore>,
    oracle: Arc<MockOracle>,
    ocr: Arc<MockOcr>,
) -> Collaborators {
    Collaborators {
        embedder,
        vector_store: store,
        oracle,
        ocr,
    }
}

pub fn knowledge_candidate(id: &str, similarity: f32, rag_name: &str) -> Candidate {
    let mut payload = Map::new();
    payload.insert("question_rag_name".into(), Value::from(rag_name));
    payload.insert("question".into(), Value::from(format!("{rag_name}?")));
    payload.insert("answer_id".into(), Value::from(format!("ans-{id}")));
    payload.insert("category_id".into(), Value::from("cat-1"));
    Candidate {
        id: id.to_string(),
        similarity,
        payload,
    }
}

pub fn document_candidate(id: &str, similarity: f32, text: &str, page: i64) -> Candidate {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::from(text));
    payload.insert("doc_id".into(), Value::from(format!("doc-{id}")));
    payload.insert("filename".into(), Value::from("perwal_12.pdf"));
    payload.insert("page_number".into(), Value::from(page));
    payload.insert("category".into(), Value::from("Peraturan"));
    Candidate {
        id: id.to_string(),
        similarity,
        payload,
    }
}
