//! ragserve - CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragserve::collaborators::{
    ChatOracle, Collaborators, HttpOcrEngine, OllamaEmbedder, QdrantStore, VectorStore,
};
use ragserve::config::Config;
use ragserve::ingest::IngestPipeline;
use ragserve::knowledge::KnowledgeSync;
use ragserve::query::QueryPipeline;
use ragserve::types::{DocumentJob, Query};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragserve", version, about = "RAG backend for a public-service knowledge base")]
struct Args {
    /// Path to the configuration file (defaults to ~/.ragserve/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a query and print the response envelope as JSON
    Query {
        /// The question to answer
        text: String,
        /// Override the number of candidates retrieved
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Ingest one document into the document collection
    Ingest {
        #[arg(long)]
        doc_id: String,
        /// Owning agency name, stored in every chunk's payload
        #[arg(long)]
        opd_name: String,
        #[arg(long)]
        category: String,
        /// http(s) or file URL of the document
        #[arg(long)]
        file_url: String,
    },
    /// Remove every chunk of a document from the document collection
    Delete {
        #[arg(long)]
        doc_id: String,
    },
    /// Sync curated knowledge entries from a JSON export file
    Sync {
        /// Path to a JSON array of knowledge entries
        file: PathBuf,
    },
    /// Print the resolved configuration
    Config,
    /// Print the default configuration file path
    ConfigPath,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragserve=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = Arc::new(config);

    match args.command {
        Commands::Query { text, limit } => {
            let collaborators = build_collaborators(&config)?;
            let pipeline = QueryPipeline::new(collaborators, config);
            let mut query = Query::new(text);
            query.limit = limit;
            let result = pipeline.resolve(&query).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Ingest {
            doc_id,
            opd_name,
            category,
            file_url,
        } => {
            let collaborators = build_collaborators(&config)?;
            collaborators
                .vector_store
                .ensure_collection(&config.qdrant.document_collection, config.embedding.dim)
                .await?;

            let pipeline = IngestPipeline::new(collaborators, config);
            let report = pipeline
                .ingest(&DocumentJob {
                    doc_id,
                    opd_name,
                    category,
                    file_url,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Delete { doc_id } => {
            let collaborators = build_collaborators(&config)?;
            let pipeline = IngestPipeline::new(collaborators, config);
            pipeline.delete_document(&doc_id).await?;
            println!("Deleted document '{doc_id}'");
        }
        Commands::Sync { file } => {
            let entries = ragserve::knowledge::load_entries(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;

            let collaborators = build_collaborators(&config)?;
            collaborators
                .vector_store
                .ensure_collection(&config.qdrant.knowledge_collection, config.embedding.dim)
                .await?;

            let sync = KnowledgeSync::new(collaborators, config);
            let count = sync.bulk_sync(&entries).await?;
            println!("Synced {count} knowledge entries");
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(config.as_ref())?);
        }
        Commands::ConfigPath => {
            println!("{}", Config::config_path()?.display());
        }
    }

    Ok(())
}

fn build_collaborators(config: &Config) -> Result<Collaborators> {
    Ok(Collaborators {
        embedder: Arc::new(OllamaEmbedder::new(
            &config.embedding.base_url,
            &config.embedding.model,
        )?),
        vector_store: Arc::new(QdrantStore::new(&config.qdrant.url)?),
        oracle: Arc::new(ChatOracle::new(
            &config.llm.base_url,
            &config.llm.api_key,
            &config.llm.model,
            config.llm.timeout_sec,
        )?),
        ocr: Arc::new(HttpOcrEngine::new(&config.ocr.base_url)?),
    })
}
