//! Vector store client
//!
//! Qdrant behind a narrow trait: nearest-neighbor search over named
//! collections, payload-filtered deletes for idempotent re-ingestion, and
//! batched upserts. The store is opaque to the pipelines; they only see
//! `Candidate`s and `PointRecord`s.

use crate::errors::{Result, ServiceError};
use crate::types::Candidate;
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, points_selector::PointsSelectorOneOf,
        r#match::MatchValue, vectors_config::Config, with_payload_selector::SelectorOptions,
        Condition, CreateCollection, Distance, FieldCondition, Filter, Match, PointId,
        PointStruct, PointsIdsList, PointsSelector, SearchPoints, Value as QdrantValue,
        VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Exact-match payload condition applied to a search or delete.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub key: String,
    pub value: String,
}

impl FieldFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One point to upsert: id, vector, payload.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, JsonValue>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet
    async fn ensure_collection(&self, collection: &str, dim: u64) -> Result<()>;

    /// Top-`limit` nearest neighbors, optionally restricted by a payload
    /// condition
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<Candidate>>;

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    /// Delete every point whose payload matches the condition
    async fn delete_by_field(&self, collection: &str, filter: FieldFilter) -> Result<()>;

    /// Delete every point matching `filter` except those also matching
    /// `unless`; lets a caller sweep stale generations of a document
    /// while the current one stays untouched
    async fn delete_by_field_except(
        &self,
        collection: &str,
        filter: FieldFilter,
        unless: FieldFilter,
    ) -> Result<()>;

    /// Delete specific points by id
    async fn delete_points(&self, collection: &str, ids: Vec<String>) -> Result<()>;
}

/// Qdrant-backed vector store
pub struct QdrantStore {
    client: QdrantClient,
}

impl QdrantStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        Ok(Self { client })
    }
}

fn keyword_condition(filter: &FieldFilter) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: filter.key.clone(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(filter.value.clone())),
            }),
            ..Default::default()
        })),
    }
}

fn match_filter(filter: &FieldFilter) -> Filter {
    Filter {
        must: vec![keyword_condition(filter)],
        ..Default::default()
    }
}

fn match_except_filter(filter: &FieldFilter, unless: &FieldFilter) -> Filter {
    Filter {
        must: vec![keyword_condition(filter)],
        must_not: vec![keyword_condition(unless)],
        ..Default::default()
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, collection: &str, dim: u64) -> Result<()> {
        let collections_list = self
            .client
            .list_collections()
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        let exists = collections_list
            .collections
            .iter()
            .any(|c| c.name == collection);

        if !exists {
            self.client
                .create_collection(&CreateCollection {
                    collection_name: collection.to_string(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: dim,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    ServiceError::collaborator(
                        "qdrant",
                        format!("create collection '{collection}': {e}"),
                    )
                })?;
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<Candidate>> {
        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: collection.to_string(),
                vector: vector.to_vec(),
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                filter: filter.as_ref().map(match_filter),
                ..Default::default()
            })
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        let candidates = search_result
            .result
            .into_iter()
            .map(|point| {
                let mut payload = Map::new();
                for (key, value) in point.payload {
                    if let Some(json_val) = qdrant_to_json_value(&value) {
                        payload.insert(key, json_val);
                    }
                }

                Candidate {
                    id: point_id_to_string(&point.id),
                    // Cosine similarity from Qdrant is already in [0, 1]
                    // for normalized embeddings; clamp against drift
                    similarity: point.score.clamp(0.0, 1.0),
                    payload,
                }
            })
            .collect();

        Ok(candidates)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|record| {
                let mut payload_map = HashMap::new();
                for (key, value) in record.payload {
                    payload_map.insert(key, json_to_qdrant_value(value));
                }
                PointStruct::new(record.id, record.vector, payload_map)
            })
            .collect();

        self.client
            .upsert_points_blocking(collection, None, points, None)
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        Ok(())
    }

    async fn delete_by_field(&self, collection: &str, filter: FieldFilter) -> Result<()> {
        self.client
            .delete_points(
                collection,
                None,
                &PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Filter(match_filter(
                        &filter,
                    ))),
                },
                None,
            )
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        Ok(())
    }

    async fn delete_by_field_except(
        &self,
        collection: &str,
        filter: FieldFilter,
        unless: FieldFilter,
    ) -> Result<()> {
        self.client
            .delete_points(
                collection,
                None,
                &PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Filter(
                        match_except_filter(&filter, &unless),
                    )),
                },
                None,
            )
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.client
            .delete_points(
                collection,
                None,
                &PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                        ids: ids.into_iter().map(PointId::from).collect(),
                    })),
                },
                None,
            )
            .await
            .map_err(|e| ServiceError::collaborator("qdrant", e.to_string()))?;

        Ok(())
    }
}

// Payload value conversions between serde_json and the Qdrant protobuf types
fn json_to_qdrant_value(json: JsonValue) -> QdrantValue {
    match json {
        JsonValue::String(s) => QdrantValue::from(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                QdrantValue::from(i)
            } else if let Some(f) = n.as_f64() {
                QdrantValue::from(f)
            } else {
                QdrantValue::from(0)
            }
        }
        JsonValue::Bool(b) => QdrantValue::from(b),
        JsonValue::Null => QdrantValue::from(""),
        other => QdrantValue::from(other.to_string()),
    }
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
            Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
            Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
            Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
            _ => None,
        }
    })
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .map(|id| {
            use qdrant_client::qdrant::point_id::PointIdOptions;
            match &id.point_id_options {
                Some(PointIdOptions::Num(n)) => n.to_string(),
                Some(PointIdOptions::Uuid(u)) => u.clone(),
                None => "unknown".to_string(),
            }
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_through_qdrant_value() {
        let cases = vec![
            JsonValue::String("teks".to_string()),
            JsonValue::Number(7.into()),
            JsonValue::Bool(true),
        ];
        for case in cases {
            let converted = json_to_qdrant_value(case.clone());
            assert_eq!(qdrant_to_json_value(&converted), Some(case));
        }
    }

    #[test]
    fn test_field_filter_builds_keyword_match() {
        let filter = match_filter(&FieldFilter::new("doc_id", "d-1"));
        assert_eq!(filter.must.len(), 1);
        assert!(filter.must_not.is_empty());
    }

    #[test]
    fn test_except_filter_excludes_the_kept_value() {
        let filter = match_except_filter(
            &FieldFilter::new("doc_id", "d-1"),
            &FieldFilter::new("generation", "gen-2"),
        );
        assert_eq!(filter.must.len(), 1);
        assert_eq!(filter.must_not.len(), 1);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_ensure_and_search_empty_collection() {
        let store = QdrantStore::new("http://127.0.0.1:6334").unwrap();
        store.ensure_collection("ragserve_test", 4).await.unwrap();
        let hits = store
            .search("ragserve_test", &[0.1, 0.2, 0.3, 0.4], 5, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
