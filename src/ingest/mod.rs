
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingFailure};
use crate::embeddings::chunking::{split_text, strip_markup};
use crate::embeddings::{Embedder, TaskType};
use crate::index::{ChunkMetadata, FlatIndex, MetadataBundle, normalize_l2};
use crate::{RagError, Result};

const CORPUS_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// One source file read from the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub source: String,
    pub content: String,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub batches: usize,
    pub zero_filled_batches: usize,
    pub dimension: usize,
}

/// Run the full ingestion pipeline: read the corpus, chunk every document,
/// embed the chunks in batches, and persist the index and metadata bundle
/// under the configuration directory.
///
/// Both artifacts are written atomically, index first; an aborted run leaves
/// any previously persisted artifacts untouched.
#[inline]
pub fn run(config: &Config, embedder: &dyn Embedder, corpus_dir: &Path) -> Result<IngestStats> {
    let documents = read_corpus(corpus_dir)?;
    info!("Read {} documents from {}", documents.len(), corpus_dir.display());

    let (chunks, metadata) = process_documents(&documents, config);
    if chunks.is_empty() {
        return Err(RagError::CorpusNoChunks(corpus_dir.to_path_buf()));
    }
    info!("Produced {} chunks from {} documents", chunks.len(), documents.len());

    let (mut vectors, stats) = embed_in_batches(embedder, &chunks, config)?;

    let dimension = config.gemini.embedding_dimension as usize;
    let mut index = FlatIndex::new(dimension)?;
    for vector in &mut vectors {
        normalize_l2(vector);
        index.add(vector)?;
    }

    let bundle = MetadataBundle::new(chunks, metadata)?;

    fs::create_dir_all(&config.base_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.base_dir.display()
        )
    })?;
    index.write_to(&config.index_path())?;
    bundle.write_to(&config.metadata_path())?;

    Ok(IngestStats {
        documents: documents.len(),
        chunks: bundle.len(),
        dimension,
        ..stats
    })
}

/// Enumerate supported documents under the corpus directory in filename
/// order, so repeated runs over the same corpus index rows identically.
#[inline]
pub fn read_corpus(corpus_dir: &Path) -> Result<Vec<Document>> {
    if !corpus_dir.is_dir() {
        return Err(RagError::CorpusMissing(corpus_dir.to_path_buf()));
    }

    let mut paths: Vec<_> = fs::read_dir(corpus_dir)
        .with_context(|| format!("Failed to read corpus directory: {}", corpus_dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| CORPUS_EXTENSIONS.contains(&ext))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(RagError::CorpusEmpty(corpus_dir.to_path_buf()));
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        documents.push(Document {
            filename,
            source: path.display().to_string(),
            content,
        });
    }

    Ok(documents)
}

/// Chunk every document and build parallel metadata. Chunks at or below the
/// minimum length are dropped; `chunk_id` numbers the kept chunks of each
/// document contiguously from 0.
#[inline]
pub fn process_documents(
    documents: &[Document],
    config: &Config,
) -> (Vec<String>, Vec<ChunkMetadata>) {
    let mut chunks = Vec::new();
    let mut metadata = Vec::new();

    for document in documents {
        let cleaned = strip_markup(&document.content);
        let mut chunk_id = 0;

        for chunk in split_text(&cleaned, &config.chunking) {
            if chunk.trim().len() <= config.chunking.min_chunk_len {
                continue;
            }

            metadata.push(ChunkMetadata {
                filename: document.filename.clone(),
                chunk_id,
                source: document.source.clone(),
            });
            chunks.push(chunk);
            chunk_id += 1;
        }
    }

    (chunks, metadata)
}

/// Embed chunks in fixed-size batches, validating that the provider returned
/// one vector of the configured dimensionality per chunk.
///
/// A batch whose retries are exhausted is handled per the configured policy:
/// abort the run, or substitute zero vectors and continue.
fn embed_in_batches(
    embedder: &dyn Embedder,
    chunks: &[String],
    config: &Config,
) -> Result<(Vec<Vec<f32>>, IngestStats)> {
    let batch_size = config.gemini.batch_size as usize;
    let dimension = config.gemini.embedding_dimension as usize;

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    let mut stats = IngestStats::default();

    for batch in chunks.chunks(batch_size) {
        stats.batches += 1;

        match embedder.embed_batch(batch, TaskType::Document) {
            Ok(embedded) => {
                if embedded.len() != batch.len() {
                    return Err(RagError::Embedding(format!(
                        "Provider returned {} vectors for a batch of {}",
                        embedded.len(),
                        batch.len()
                    )));
                }
                for vector in &embedded {
                    if vector.len() != dimension {
                        return Err(RagError::Embedding(format!(
                            "Provider returned a vector of dimension {}, expected {}",
                            vector.len(),
                            dimension
                        )));
                    }
                }
                vectors.extend(embedded);
            }
            Err(e) => match config.ingest.embedding_failure {
                EmbeddingFailure::Abort => {
                    return Err(RagError::Embedding(format!(
                        "Embedding batch {} failed after retries: {e}",
                        stats.batches
                    )));
                }
                EmbeddingFailure::ZeroFill => {
                    warn!(
                        "Embedding batch {} failed after retries, substituting zero vectors: {e}",
                        stats.batches
                    );
                    stats.zero_filled_batches += 1;
                    vectors.extend(std::iter::repeat_n(vec![0.0; dimension], batch.len()));
                }
            },
        }
    }

    Ok((vectors, stats))
}
