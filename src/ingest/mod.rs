//! Document ingestion: fetch, chunking, pipeline

pub mod chunker;
pub mod fetch;
pub mod pipeline;

pub use chunker::Chunker;
pub use pipeline::IngestPipeline;
