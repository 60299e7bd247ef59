//! Document ingestion pipeline
//!
//! fetch -> OCR extraction -> chunking -> embedding -> atomic replacement
//! in the document collection. `doc_id` is the idempotency key: every run
//! writes a fresh generation of points, then sweeps the older generations
//! of the same document, under a per-document lock so concurrent jobs for
//! the same id cannot interleave. A failure mid-upsert removes only the
//! new generation's points; the previous generation keeps serving.

use crate::collaborators::{Collaborators, FieldFilter, PointRecord};
use crate::config::Config;
use crate::errors::{IngestStage, Result, ServiceError};
use crate::ingest::chunker::Chunker;
use crate::ingest::fetch::Fetcher;
use crate::types::{Chunk, DocumentJob, IngestReport, StageTimings};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Upsert batch size; keeps a big document from turning into one huge
/// gRPC request
const UPSERT_BATCH: usize = 128;

pub struct IngestPipeline {
    collaborators: Collaborators,
    fetcher: Fetcher,
    chunker: Chunker,
    config: Arc<Config>,
    /// One lock per doc_id currently being replaced; entries are evicted
    /// once no job holds or awaits them
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestPipeline {
    pub fn new(collaborators: Collaborators, config: Arc<Config>) -> Self {
        Self {
            collaborators,
            fetcher: Fetcher::new(reqwest::Client::new()),
            chunker: Chunker::new(config.chunker.clone()),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one job to completion. All-or-nothing: every chunk is embedded
    /// before a single point is written, and the previous generation of
    /// the document stays in place until the new one is fully upserted.
    pub async fn ingest(&self, job: &DocumentJob) -> Result<IngestReport> {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let generation = Uuid::new_v4().to_string();
        info!(doc_id = %job.doc_id, file_url = %job.file_url, %generation, "ingestion started");

        let stage = Instant::now();
        let fetched = self.fetcher.fetch(&job.doc_id, &job.file_url).await?;
        timings.fetch_sec = stage.elapsed().as_secs_f64();

        let stage = Instant::now();
        let pages = self
            .collaborators
            .ocr
            .extract(fetched.content, &fetched.filename, &self.config.ocr.lang)
            .await
            .map_err(|err| ServiceError::Ingestion {
                doc_id: job.doc_id.clone(),
                stage: IngestStage::Extract,
                message: err.to_string(),
            })?;
        timings.extract_sec = stage.elapsed().as_secs_f64();

        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(ServiceError::Ingestion {
                doc_id: job.doc_id.clone(),
                stage: IngestStage::Extract,
                message: format!("'{}' yielded no text", fetched.filename),
            });
        }

        let stage = Instant::now();
        let full_text = pages.join("\n\n");
        let chunks = self.chunker.chunk(&full_text);
        if chunks.is_empty() {
            return Err(ServiceError::Ingestion {
                doc_id: job.doc_id.clone(),
                stage: IngestStage::Chunk,
                message: "chunker produced no chunks".to_string(),
            });
        }
        let page_numbers = attribute_pages(&chunks, &pages);
        timings.chunk_sec = stage.elapsed().as_secs_f64();
        info!(doc_id = %job.doc_id, pages = pages.len(), chunks = chunks.len(), "document chunked");

        let stage = Instant::now();
        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, page_number) in chunks.iter().zip(&page_numbers) {
            let vector = self
                .collaborators
                .embedder
                .embed(&format!("passage: {}", chunk.embed_text))
                .await
                .map_err(|err| ServiceError::Ingestion {
                    doc_id: job.doc_id.clone(),
                    stage: IngestStage::Embed,
                    message: format!("chunk {}: {err}", chunk.index),
                })?;
            points.push(PointRecord {
                id: chunk_point_id(&job.doc_id, &generation, chunk.index),
                vector,
                payload: chunk_payload(job, chunk, *page_number, &fetched.filename, &generation),
            });
        }
        timings.embed_sec = stage.elapsed().as_secs_f64();

        let stage = Instant::now();
        self.replace_document(&job.doc_id, &generation, points)
            .await?;
        timings.replace_sec = stage.elapsed().as_secs_f64();
        timings.total_sec = started.elapsed().as_secs_f64();

        info!(
            doc_id = %job.doc_id,
            chunks = chunks.len(),
            total_sec = timings.total_sec,
            "ingestion finished"
        );

        Ok(IngestReport {
            doc_id: job.doc_id.clone(),
            filename: fetched.filename,
            total_pages: pages.len(),
            chunks_indexed: chunks.len(),
            timings,
        })
    }

    /// Remove every chunk of a document from the collection.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let lock = self.doc_lock(doc_id);
        let result = async {
            let _guard = lock.lock().await;
            self.collaborators
                .vector_store
                .delete_by_field(
                    &self.config.qdrant.document_collection,
                    FieldFilter::new("doc_id", doc_id),
                )
                .await
        }
        .await;
        self.release_doc_lock(doc_id, lock);
        result
    }

    /// Number of doc ids currently holding a replacement lock entry.
    pub fn pending_doc_locks(&self) -> usize {
        self.locks.lock().expect("lock map poisoned").len()
    }

    async fn replace_document(
        &self,
        doc_id: &str,
        generation: &str,
        points: Vec<PointRecord>,
    ) -> Result<()> {
        let lock = self.doc_lock(doc_id);
        let result = self
            .replace_locked(&lock, doc_id, generation, points)
            .await;
        self.release_doc_lock(doc_id, lock);
        result
    }

    /// Upsert the new generation fully, then sweep every older generation
    /// of the document. A failed upsert deletes only the new points, so
    /// the previous generation is never lost.
    async fn replace_locked(
        &self,
        lock: &tokio::sync::Mutex<()>,
        doc_id: &str,
        generation: &str,
        points: Vec<PointRecord>,
    ) -> Result<()> {
        let _guard = lock.lock().await;
        let collection = &self.config.qdrant.document_collection;

        let mut written: Vec<String> = Vec::with_capacity(points.len());
        for batch in points.chunks(UPSERT_BATCH) {
            let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
            if let Err(err) = self
                .collaborators
                .vector_store
                .upsert(collection, batch.to_vec())
                .await
            {
                if let Err(cleanup) = self
                    .collaborators
                    .vector_store
                    .delete_points(collection, written)
                    .await
                {
                    warn!(%doc_id, error = %cleanup, "removal of partially written generation failed");
                }
                return Err(ServiceError::Ingestion {
                    doc_id: doc_id.to_string(),
                    stage: IngestStage::Replace,
                    message: format!("upserting chunks: {err}"),
                });
            }
            written.extend(ids);
        }

        self.collaborators
            .vector_store
            .delete_by_field_except(
                collection,
                FieldFilter::new("doc_id", doc_id),
                FieldFilter::new("generation", generation),
            )
            .await
            .map_err(|err| ServiceError::Ingestion {
                doc_id: doc_id.to_string(),
                stage: IngestStage::Replace,
                message: format!("sweeping stale generations: {err}"),
            })?;

        Ok(())
    }

    fn doc_lock(&self, doc_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_doc_lock(&self, doc_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        // Two handles means the map's entry plus ours: nobody is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(doc_id);
        }
    }
}

/// Deterministic point id for a chunk within one generation of a
/// document; distinct generations never collide, so a new generation can
/// be written alongside the old one before the sweep.
pub fn chunk_point_id(doc_id: &str, generation: &str, index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("{doc_id}-{generation}-{index}").as_bytes(),
    )
    .to_string()
}

fn chunk_payload(
    job: &DocumentJob,
    chunk: &Chunk,
    page_number: usize,
    filename: &str,
    generation: &str,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("doc_id".into(), Value::from(job.doc_id.clone()));
    payload.insert("opd_name".into(), Value::from(job.opd_name.clone()));
    payload.insert("category".into(), Value::from(job.category.clone()));
    payload.insert("chunk_index".into(), Value::from(chunk.index));
    payload.insert("text".into(), Value::from(chunk.text.clone()));
    payload.insert("page_number".into(), Value::from(page_number));
    payload.insert("filename".into(), Value::from(filename.to_string()));
    payload.insert("generation".into(), Value::from(generation.to_string()));
    payload.insert(
        "created_at".into(),
        Value::from(chrono::Utc::now().to_rfc3339()),
    );
    payload
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 1-based page number where each chunk starts. Chunk texts are
/// whitespace-normalized fragments of the page texts, so attribution is a
/// substring search over the normalized document with a moving cursor to
/// disambiguate repeated passages.
fn attribute_pages(chunks: &[Chunk], pages: &[String]) -> Vec<usize> {
    let mut doc = String::new();
    let mut page_starts = Vec::with_capacity(pages.len());
    for page in pages {
        if !doc.is_empty() {
            doc.push(' ');
        }
        page_starts.push(doc.len());
        doc.push_str(&normalize_ws(page));
    }

    let mut numbers = Vec::with_capacity(chunks.len());
    let mut cursor = 0;
    let mut last_page = 1;
    for chunk in chunks {
        let normalized = normalize_ws(&chunk.text);
        let snippet: String = normalized.chars().take(120).collect();

        let pos = doc[cursor..]
            .find(&snippet)
            .map(|p| cursor + p)
            .or_else(|| doc.find(&snippet));

        match pos {
            Some(pos) => {
                let page = page_starts
                    .iter()
                    .rposition(|&start| start <= pos)
                    .map(|i| i + 1)
                    .unwrap_or(1);
                last_page = page;
                cursor = pos;
                numbers.push(page);
            }
            None => numbers.push(last_page),
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.to_string(),
            embed_text: text.to_string(),
        }
    }

    #[test]
    fn test_chunk_point_id_is_deterministic_per_generation() {
        assert_eq!(
            chunk_point_id("d-1", "gen-a", 0),
            chunk_point_id("d-1", "gen-a", 0)
        );
        assert_ne!(
            chunk_point_id("d-1", "gen-a", 0),
            chunk_point_id("d-1", "gen-a", 1)
        );
        assert_ne!(
            chunk_point_id("d-1", "gen-a", 0),
            chunk_point_id("d-1", "gen-b", 0)
        );
        assert_ne!(
            chunk_point_id("d-1", "gen-a", 0),
            chunk_point_id("d-2", "gen-a", 0)
        );
        // Valid UUID, Qdrant accepts it as a point id
        assert!(Uuid::parse_str(&chunk_point_id("d-1", "gen-a", 3)).is_ok());
    }

    #[test]
    fn test_attribute_pages_maps_chunks_to_source_pages() {
        let pages = vec![
            "Halaman pertama tentang persyaratan izin usaha.".to_string(),
            "Halaman kedua tentang biaya retribusi dan jadwal.".to_string(),
        ];
        let chunks = vec![
            chunk(0, "Halaman pertama tentang persyaratan izin usaha."),
            chunk(1, "Halaman kedua tentang biaya retribusi dan jadwal."),
        ];
        assert_eq!(attribute_pages(&chunks, &pages), vec![1, 2]);
    }

    #[test]
    fn test_attribute_pages_repeated_text_advances() {
        let pages = vec![
            "Pasal satu berlaku umum.".to_string(),
            "Pasal satu berlaku umum.".to_string(),
        ];
        let chunks = vec![
            chunk(0, "Pasal satu berlaku umum."),
            chunk(1, "Pasal satu berlaku umum."),
        ];
        let numbers = attribute_pages(&chunks, &pages);
        assert_eq!(numbers.len(), 2);
        assert!(numbers[1] >= numbers[0]);
    }

    #[test]
    fn test_attribute_pages_unknown_chunk_keeps_last_page() {
        let pages = vec!["Isi halaman satu.".to_string()];
        let chunks = vec![chunk(0, "Teks yang tidak ada di dokumen")];
        assert_eq!(attribute_pages(&chunks, &pages), vec![1]);
    }

    #[test]
    fn test_chunk_payload_carries_job_metadata() {
        let job = DocumentJob {
            doc_id: "d-9".to_string(),
            opd_name: "Dinas Kependudukan".to_string(),
            category: "Peraturan".to_string(),
            file_url: "https://host/perwal.pdf".to_string(),
        };
        let payload = chunk_payload(&job, &chunk(2, "isi"), 4, "perwal.pdf", "gen-1");
        assert_eq!(payload["doc_id"], "d-9");
        assert_eq!(payload["opd_name"], "Dinas Kependudukan");
        assert_eq!(payload["category"], "Peraturan");
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["page_number"], 4);
        assert_eq!(payload["filename"], "perwal.pdf");
        assert_eq!(payload["generation"], "gen-1");
        assert!(payload.contains_key("created_at"));
    }
}
