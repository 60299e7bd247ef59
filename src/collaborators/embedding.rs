//! Embedding provider client
//!
//! The embedding model is an opaque external function `text -> vector`,
//! reached over the Ollama embeddings API. Query and passage texts are
//! prefixed by the callers (`"query: "` / `"passage: "`) as the e5 model
//! family expects.

use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Maps text to a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// HTTP client for the Ollama embeddings endpoint
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ServiceError::collaborator("embedding", e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| ServiceError::collaborator("embedding", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::collaborator(
                "embedding",
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::collaborator("embedding", e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(ServiceError::collaborator("embedding", "empty vector"));
        }

        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:11434", "multilingual-e5-small");
        assert!(embedder.is_ok());
    }

    #[tokio::test]
    async fn test_embed_unreachable_host_is_collaborator_error() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:1", "m").unwrap();
        let err = embedder.embed("query: test").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Collaborator { name: "embedding", .. }
        ));
    }
}
