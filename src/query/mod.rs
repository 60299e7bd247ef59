//! Query resolution: pipeline, scorer, lexical helpers

pub mod lexicon;
pub mod pipeline;
pub mod scoring;

pub use pipeline::QueryPipeline;
pub use scoring::Scorer;
