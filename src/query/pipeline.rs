//! Query resolution pipeline
//!
//! pre-filter -> primary vector search -> relevance check -> scoring ->
//! confidence-gated fallback -> response assembly. The pipeline never
//! raises to its caller: every internal failure degrades to a
//! zero-confidence `SearchResult`.

use crate::collaborators::{Collaborators, FieldFilter};
use crate::config::{Config, RelevancePolicy};
use crate::errors::Result;
use crate::query::{lexicon, scoring::Scorer};
use crate::types::{Candidate, Query, ResultEntry, ScoredCandidate, SearchResult, Source};
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct QueryPipeline {
    collaborators: Collaborators,
    scorer: Scorer,
    config: Arc<Config>,
}

impl QueryPipeline {
    pub fn new(collaborators: Collaborators, config: Arc<Config>) -> Self {
        let scorer = Scorer::new(config.scoring.clone());
        Self {
            collaborators,
            scorer,
            config,
        }
    }

    /// Resolve a query to exactly one `SearchResult`. Infallible by
    /// contract: collaborator failures are logged and converted to a
    /// zero-confidence result at this boundary.
    pub async fn resolve(&self, query: &Query) -> SearchResult {
        let query_id = Uuid::new_v4();
        info!(%query_id, query = %query.text, metadata = ?query.metadata, "resolving query");

        match self.run(query, query_id).await {
            Ok(result) => {
                info!(
                    %query_id,
                    confidence = result.confidence,
                    source = ?result.source,
                    fallback_used = result.fallback_used,
                    "query resolved"
                );
                result
            }
            Err(err) => {
                error!(%query_id, query = %query.text, error = %err, "query degraded to zero confidence");
                SearchResult::no_confidence("Layanan pencarian sedang tidak tersedia", false)
            }
        }
    }

    async fn run(&self, query: &Query, query_id: Uuid) -> Result<SearchResult> {
        let raw = query.text.trim();
        if raw.is_empty() {
            return Ok(SearchResult::rejected("Pertanyaan kosong"));
        }

        // Cheap local rejection first; no oracle or vector call is spent
        // on obviously unanswerable input
        if let Some(reason) = lexicon::hard_filter(raw, &self.config.prefilter) {
            info!(%query_id, %reason, "rejected by hard filter");
            return Ok(SearchResult::rejected(reason));
        }

        let verdict = self.collaborators.oracle.reformulate(raw).await?;
        if !verdict.valid {
            info!(%query_id, reason = %verdict.reason, "rejected by oracle pre-filter");
            let reason = if verdict.reason.is_empty() {
                "Pertanyaan di luar cakupan layanan".to_string()
            } else {
                verdict.reason
            };
            return Ok(SearchResult::rejected(reason));
        }

        let question = lexicon::normalize_text(&lexicon::strip_phrases(
            &verdict.clean_question,
            &self.config.prefilter.strip_phrases,
        ));
        let category = lexicon::detect_category(&question, &self.config.categories);
        if let Some(rule) = category {
            info!(%query_id, category = %rule.name, "category detected");
        }

        let vector = self
            .collaborators
            .embedder
            .embed(&format!("query: {question}"))
            .await?;
        let limit = query.limit.unwrap_or(self.config.search.top_k);

        let primary = self
            .search_round(
                &self.config.qdrant.knowledge_collection,
                &vector,
                raw,
                &question,
                limit,
                category.map(|rule| FieldFilter::new("category_id", rule.id.clone())),
            )
            .await?;

        if let Some(best) = primary.first() {
            if best.combined_score >= self.config.search.fallback_threshold {
                return Ok(self.assemble(primary, Source::Knowledge, false, None));
            }
        }

        // Primary came up empty or not confident enough; same query, same
        // vector, against the OCR document corpus
        info!(%query_id, "falling back to document collection");
        let fallback = self
            .search_round(
                &self.config.qdrant.document_collection,
                &vector,
                raw,
                &question,
                limit,
                None,
            )
            .await?;

        if fallback.is_empty() {
            if primary.is_empty() {
                return Ok(SearchResult::no_confidence(
                    "Tidak ada hasil yang cukup relevan",
                    true,
                ));
            }
            // The low-confidence knowledge answer is still the best we
            // have; the caller decides how to present it
            return Ok(self.assemble(primary, Source::Knowledge, true, None));
        }

        let summary = self.maybe_summarize(&fallback).await;
        Ok(self.assemble(fallback, Source::Document, true, summary))
    }

    /// One collection pass: vector search, relevance filter, scoring.
    /// Returns scored survivors, best first; empty when nothing survives.
    async fn search_round(
        &self,
        collection: &str,
        vector: &[f32],
        raw_query: &str,
        question: &str,
        limit: usize,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<ScoredCandidate>> {
        let candidates = self
            .collaborators
            .vector_store
            .search(collection, vector, limit, filter)
            .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let survivors = self.relevance_filter(raw_query, candidates).await?;
        Ok(self.scorer.rank(survivors, question))
    }

    /// Apply the configured relevance policy. `TopOnly` mirrors the
    /// check-then-accept behavior: one judgment on the best hit decides
    /// for the whole set. `All` judges every candidate concurrently;
    /// scoring is order-independent so this changes nothing observable.
    async fn relevance_filter(
        &self,
        raw_query: &str,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<Candidate>> {
        match self.config.search.relevance_policy {
            RelevancePolicy::TopOnly => {
                let top_text = candidates[0].text().to_string();
                let verdict = self.collaborators.oracle.judge(raw_query, &top_text).await?;
                if verdict.relevant {
                    Ok(candidates)
                } else {
                    info!(reason = %verdict.reason, "top candidate judged irrelevant, dropping set");
                    Ok(Vec::new())
                }
            }
            RelevancePolicy::All => {
                let judgments = join_all(candidates.iter().map(|c| {
                    let text = c.text().to_string();
                    async move { self.collaborators.oracle.judge(raw_query, &text).await }
                }))
                .await;

                let mut survivors = Vec::with_capacity(candidates.len());
                for (candidate, judgment) in candidates.into_iter().zip(judgments) {
                    if judgment?.relevant {
                        survivors.push(candidate);
                    }
                }
                Ok(survivors)
            }
        }
    }

    async fn maybe_summarize(&self, scored: &[ScoredCandidate]) -> Option<String> {
        if !self.config.search.post_summary {
            return None;
        }

        let texts: Vec<String> = scored
            .iter()
            .take(self.config.search.post_summary_top_k)
            .map(|s| s.candidate.text().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            return None;
        }

        match self.collaborators.oracle.summarize(&texts, 5).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                // Summaries are a garnish; never fail the query over one
                warn!(error = %err, "post-summarization failed, returning plain results");
                None
            }
        }
    }

    fn assemble(
        &self,
        scored: Vec<ScoredCandidate>,
        source: Source,
        fallback_used: bool,
        summary: Option<String>,
    ) -> SearchResult {
        let confidence = scored.first().map(|s| s.combined_score).unwrap_or(0.0);
        let results = scored
            .into_iter()
            .map(|s| normalize_entry(s, source))
            .collect();

        SearchResult {
            results,
            confidence,
            source,
            fallback_used,
            message: "Hasil ditemukan".to_string(),
            summary,
        }
    }
}

/// Map a winning candidate's payload onto the fixed response schema. The
/// field names are identical for both collections by design; callers must
/// never need to branch on `source`.
fn normalize_entry(scored: ScoredCandidate, source: Source) -> ResultEntry {
    let ScoredCandidate {
        candidate,
        overlap_score,
        combined_score,
    } = scored;

    let payload = &candidate.payload;
    let text = candidate.text().to_string();

    let (title, reference, category) = match source {
        Source::Knowledge => (
            payload
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or(&text)
                .to_string(),
            payload_string(payload.get("answer_id")),
            payload_string(payload.get("category_id")),
        ),
        Source::Document => {
            let filename = payload
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let page = payload_string(payload.get("page_number")).unwrap_or_else(|| "-".to_string());
            (
                format!("[Dokumen] {filename} - Halaman {page}"),
                payload_string(payload.get("doc_id")),
                payload.get("category").and_then(Value::as_str).map(String::from),
            )
        }
    };

    ResultEntry {
        title,
        text,
        reference,
        category,
        similarity: candidate.similarity,
        overlap_score,
        combined_score,
    }
}

fn payload_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
