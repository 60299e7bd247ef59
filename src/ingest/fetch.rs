//! Document retrieval
//!
//! Pulls the raw bytes behind a job's `file_url`. Plain HTTP(S) through
//! the shared client, plus `file://` for locally staged uploads.

use crate::errors::{IngestStage, Result, ServiceError};
use bytes::Bytes;

#[derive(Debug)]
pub struct FetchedFile {
    pub filename: String,
    pub content: Bytes,
}

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, doc_id: &str, file_url: &str) -> Result<FetchedFile> {
        let filename = filename_from_url(file_url);

        let content = if let Some(path) = file_url.strip_prefix("file://") {
            Bytes::from(tokio::fs::read(path).await.map_err(|err| {
                ServiceError::Ingestion {
                    doc_id: doc_id.to_string(),
                    stage: IngestStage::Fetch,
                    message: format!("reading {path}: {err}"),
                }
            })?)
        } else {
            let response = self
                .client
                .get(file_url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| ServiceError::Ingestion {
                    doc_id: doc_id.to_string(),
                    stage: IngestStage::Fetch,
                    message: format!("GET {file_url}: {err}"),
                })?;
            response.bytes().await.map_err(|err| ServiceError::Ingestion {
                doc_id: doc_id.to_string(),
                stage: IngestStage::Fetch,
                message: format!("reading body of {file_url}: {err}"),
            })?
        };

        if content.is_empty() {
            return Err(ServiceError::Ingestion {
                doc_id: doc_id.to_string(),
                stage: IngestStage::Fetch,
                message: format!("{file_url} returned an empty body"),
            });
        }

        Ok(FetchedFile { filename, content })
    }
}

/// Last path segment of the URL, query string stripped.
pub fn filename_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://host/files/perwal_12.pdf"),
            "perwal_12.pdf"
        );
        assert_eq!(
            filename_from_url("https://host/files/perwal_12.pdf?token=abc"),
            "perwal_12.pdf"
        );
        assert_eq!(filename_from_url("file:///tmp/scan.pdf"), "scan.pdf");
        assert_eq!(filename_from_url("https://host/"), "document");
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        tokio::fs::write(&path, b"%PDF-1.4 test").await.unwrap();

        let fetcher = Fetcher::new(reqwest::Client::new());
        let url = format!("file://{}", path.display());
        let fetched = fetcher.fetch("d-1", &url).await.unwrap();
        assert_eq!(fetched.filename, "doc.pdf");
        assert_eq!(&fetched.content[..], b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_fetch_missing_local_file_is_a_fetch_error() {
        let fetcher = Fetcher::new(reqwest::Client::new());
        let err = fetcher
            .fetch("d-1", "file:///nonexistent/doc.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fetch"));
    }
}
