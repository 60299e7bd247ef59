//! OCR engine client
//!
//! Text extraction is an opaque external function `file -> pages`. The
//! service posts the raw document bytes and gets back one text per page,
//! in page order; page assembly and chunking happen in the ingestion
//! pipeline.

use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract text page by page, preserving page order
    async fn extract(&self, content: Bytes, filename: &str, lang: &str) -> Result<Vec<String>>;
}

/// HTTP client for an OCR extraction service
pub struct HttpOcrEngine {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    pages: Vec<String>,
}

impl HttpOcrEngine {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // OCR of a scanned document is slow; allow several minutes
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ServiceError::collaborator("ocr", e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn extract(&self, content: Bytes, filename: &str, lang: &str) -> Result<Vec<String>> {
        let url = format!("{}/extract", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("filename", filename), ("lang", lang)])
            .header("Content-Type", "application/octet-stream")
            .body(content)
            .send()
            .await
            .map_err(|e| ServiceError::collaborator("ocr", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::collaborator(
                "ocr",
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::collaborator("ocr", e.to_string()))?;

        Ok(parsed.pages)
    }
}
