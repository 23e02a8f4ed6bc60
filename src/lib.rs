use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus directory not found: {0}")]
    CorpusMissing(PathBuf),

    #[error("No documents found in corpus directory: {0}")]
    CorpusEmpty(PathBuf),

    #[error("No chunks above the minimum length produced from corpus directory: {0}")]
    CorpusNoChunks(PathBuf),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod retrieval;
