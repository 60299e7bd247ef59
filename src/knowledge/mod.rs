//! Knowledge collection sync
//!
//! The curated question/answer entries live in an external system of
//! record; this module mirrors them into the knowledge collection. Point
//! ids are derived from `question_id`, so re-syncing an entry overwrites
//! its previous vector instead of duplicating it.

use crate::collaborators::{Collaborators, PointRecord};
use crate::config::Config;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const UPSERT_BATCH: usize = 128;

/// One curated entry as exported by the owning system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub question_id: String,
    pub answer_id: String,
    pub category_id: String,
    /// The question as a human phrased it
    pub question: String,
    /// Retrieval text: the question reworded for embedding and overlap
    pub question_rag_name: String,
}

pub struct KnowledgeSync {
    collaborators: Collaborators,
    config: Arc<Config>,
}

impl KnowledgeSync {
    pub fn new(collaborators: Collaborators, config: Arc<Config>) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Mirror a batch of entries into the knowledge collection. Returns
    /// the number of entries written.
    pub async fn bulk_sync(&self, entries: &[KnowledgeEntry]) -> Result<usize> {
        let mut points = Vec::with_capacity(entries.len());
        for entry in entries {
            points.push(self.entry_point(entry).await?);
        }

        let collection = &self.config.qdrant.knowledge_collection;
        for batch in points.chunks(UPSERT_BATCH) {
            self.collaborators
                .vector_store
                .upsert(collection, batch.to_vec())
                .await?;
        }

        info!(count = entries.len(), "knowledge entries synced");
        Ok(entries.len())
    }

    pub async fn upsert_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        let point = self.entry_point(entry).await?;
        self.collaborators
            .vector_store
            .upsert(&self.config.qdrant.knowledge_collection, vec![point])
            .await
    }

    pub async fn delete_entry(&self, question_id: &str) -> Result<()> {
        self.collaborators
            .vector_store
            .delete_points(
                &self.config.qdrant.knowledge_collection,
                vec![entry_point_id(question_id)],
            )
            .await
    }

    async fn entry_point(&self, entry: &KnowledgeEntry) -> Result<PointRecord> {
        let vector = self
            .collaborators
            .embedder
            .embed(&format!("passage: {}", entry.question_rag_name))
            .await?;

        let mut payload = Map::new();
        payload.insert("question_id".into(), Value::from(entry.question_id.clone()));
        payload.insert("answer_id".into(), Value::from(entry.answer_id.clone()));
        payload.insert("category_id".into(), Value::from(entry.category_id.clone()));
        payload.insert("question".into(), Value::from(entry.question.clone()));
        payload.insert(
            "question_rag_name".into(),
            Value::from(entry.question_rag_name.clone()),
        );

        Ok(PointRecord {
            id: entry_point_id(&entry.question_id),
            vector,
            payload,
        })
    }
}

/// Deterministic point id from the entry's `question_id`.
pub fn entry_point_id(question_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, question_id.as_bytes()).to_string()
}

/// Read a JSON export file into entries.
pub fn load_entries(path: &Path) -> Result<Vec<KnowledgeEntry>> {
    let contents = std::fs::read_to_string(path)?;
    let entries = serde_json::from_str(&contents)?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_id_is_stable() {
        assert_eq!(entry_point_id("q-1"), entry_point_id("q-1"));
        assert_ne!(entry_point_id("q-1"), entry_point_id("q-2"));
        assert!(Uuid::parse_str(&entry_point_id("q-1")).is_ok());
    }

    #[test]
    fn test_entry_deserializes_from_export_format() {
        let json = r#"{
            "question_id": "q-7",
            "answer_id": "a-3",
            "category_id": "cat-1",
            "question": "Bagaimana cara membuat KTP?",
            "question_rag_name": "syarat pembuatan ktp elektronik"
        }"#;
        let entry: KnowledgeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.question_id, "q-7");
        assert_eq!(entry.question_rag_name, "syarat pembuatan ktp elektronik");
    }

    #[test]
    fn test_load_entries_from_export_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"[{
                "question_id": "q-1",
                "answer_id": "a-1",
                "category_id": "cat-1",
                "question": "Jam buka loket?",
                "question_rag_name": "jam operasional loket pelayanan"
            }]"#,
        )
        .unwrap();

        let entries = load_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question_id, "q-1");
    }

    #[test]
    fn test_load_entries_error_kinds() {
        use crate::errors::ServiceError;

        let missing = load_entries(Path::new("/nonexistent/export.json")).unwrap_err();
        assert!(matches!(missing, ServiceError::Io(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let malformed = load_entries(&path).unwrap_err();
        assert!(matches!(malformed, ServiceError::Serialization(_)));
    }
}
