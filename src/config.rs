//! Service configuration
//!
//! One TOML file resolved at startup. Nothing in the pipelines re-reads
//! the environment at request time; toggles like post-summarization are
//! plain fields here.

use crate::errors::ServiceError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub prefilter: PrefilterConfig,
    /// Keyword rules mapping query terms to a knowledge-collection
    /// category id; a detected category narrows the primary search
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

/// Whether the relevance oracle judges only the top candidate (the
/// source system's behavior) or every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevancePolicy {
    TopOnly,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidates retrieved per collection
    pub top_k: usize,
    /// Minimum combined score of the primary collection's best candidate;
    /// anything lower falls back to the document collection
    pub fallback_threshold: f32,
    pub relevance_policy: RelevancePolicy,
    /// Summarize top document-collection hits before responding
    pub post_summary: bool,
    pub post_summary_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fallback_threshold: 0.85,
            relevance_policy: RelevancePolicy::TopOnly,
            post_summary: false,
            post_summary_top_k: 2,
        }
    }
}

/// Weights of the combined score. Dense-leaning, summing to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub dense_weight: f32,
    pub overlap_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dense_weight: 0.65,
            overlap_weight: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Upper bound on chunk length, in characters
    pub max_size: usize,
    /// Chunks below this merge into a neighbor
    pub min_size: usize,
    /// Characters of trailing context prepended to the next chunk's
    /// embedded text; does not affect stored chunk text
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            min_size: 100,
            overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Vector dimension of the model, used when creating collections
    pub dim: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "multilingual-e5-small".to_string(),
            dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_sec: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "meta/llama-4-maverick-instruct".to_string(),
            timeout_sec: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub knowledge_collection: String,
    pub document_collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6334".to_string(),
            knowledge_collection: "knowledge_bank".to_string(),
            document_collection: "document_bank".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub base_url: String,
    pub lang: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5200".to_string(),
            lang: "id".to_string(),
        }
    }
}

/// Cheap local rejection applied before any oracle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefilterConfig {
    /// Queries with fewer words than this are rejected as unclear
    pub min_words: usize,
    /// Terms that mark a query out-of-domain outright
    pub blocked_terms: Vec<String>,
    /// Redundant phrases stripped before retrieval (e.g. the service's
    /// own locality, which adds no signal)
    pub strip_phrases: Vec<String>,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            min_words: 3,
            blocked_terms: Vec::new(),
            strip_phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
}

impl Config {
    /// Load configuration from the default path, creating a default file
    /// if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Config::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".ragserve").join("config.toml"))
    }

    /// Check cross-field invariants the pipelines rely on
    pub fn validate(&self) -> std::result::Result<(), ServiceError> {
        let weight_sum = self.scoring.dense_weight + self.scoring.overlap_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(ServiceError::Config(format!(
                "scoring weights must sum to 1.0, got {} + {}",
                self.scoring.dense_weight, self.scoring.overlap_weight
            )));
        }
        if self.chunker.min_size == 0 || self.chunker.max_size == 0 {
            return Err(ServiceError::Config(
                "chunk size bounds must be positive".to_string(),
            ));
        }
        // The merge rebalance step needs room for two min-sized halves
        if self.chunker.min_size * 2 > self.chunker.max_size {
            return Err(ServiceError::Config(format!(
                "chunker min_size {} must be at most half of max_size {}",
                self.chunker.min_size, self.chunker.max_size
            )));
        }
        if self.search.top_k == 0 {
            return Err(ServiceError::Config(
                "search top_k must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.fallback_threshold) {
            return Err(ServiceError::Config(
                "fallback_threshold must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
