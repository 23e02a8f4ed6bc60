#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embeddings::{Embedder, TaskType};
use crate::index::{ChunkMetadata, FlatIndex, MetadataBundle, normalize_l2};
use crate::Result;

/// One retrieved chunk. `rank` is the 1-based position within the filtered
/// result list, not the raw index position.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub rank: usize,
}

/// Per-query overrides; `None` falls back to the configured default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
}

struct LoadedIndex {
    index: FlatIndex,
    bundle: MetadataBundle,
}

/// Nearest-neighbor retrieval over the persisted index.
///
/// Construction never touches disk; call [`RetrievalService::initialize`]
/// to load the artifacts. Every query path is fail-soft: an unavailable
/// index or a failed embedding yields an empty result list, never an error.
pub struct RetrievalService {
    index_path: PathBuf,
    metadata_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    defaults: RetrievalConfig,
    loaded: Option<LoadedIndex>,
}

impl RetrievalService {
    #[inline]
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_path: config.index_path(),
            metadata_path: config.metadata_path(),
            embedder,
            defaults: config.retrieval.clone(),
            loaded: None,
        }
    }

    /// Load the index and metadata bundle from disk. Returns whether the
    /// service is available afterwards; a failed load is logged and leaves
    /// the service answering every query with no results.
    #[inline]
    pub fn initialize(&mut self) -> bool {
        match self.try_load() {
            Ok(loaded) => {
                info!(
                    "Loaded index with {} chunks from {}",
                    loaded.bundle.len(),
                    self.index_path.display()
                );
                self.loaded = Some(loaded);
                true
            }
            Err(e) => {
                warn!("Retrieval unavailable, failed to load index: {e}");
                self.loaded = None;
                false
            }
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.loaded.is_some()
    }

    /// Embed the query and return the chunks scoring at or above the
    /// similarity threshold, best first. Fail-soft: any error on the way
    /// yields an empty list.
    #[inline]
    pub fn search(&self, query: &str, options: SearchOptions) -> Vec<SearchResult> {
        let Some(loaded) = &self.loaded else {
            debug!("Search skipped, index not loaded");
            return Vec::new();
        };

        let top_k = options.top_k.unwrap_or(self.defaults.top_k);
        let threshold = options
            .similarity_threshold
            .unwrap_or(self.defaults.similarity_threshold);

        let mut query_vector = match self.embedder.embed(query, TaskType::Query) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed query: {e}");
                return Vec::new();
            }
        };
        normalize_l2(&mut query_vector);

        let hits = match loaded.index.search(&query_vector, top_k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Index search failed: {e}");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for (row, score) in hits {
            if score < threshold || row >= loaded.bundle.chunks.len() {
                continue;
            }

            results.push(SearchResult {
                chunk: loaded.bundle.chunks[row].clone(),
                metadata: loaded.bundle.metadata[row].clone(),
                score,
                rank: results.len() + 1,
            });
        }

        debug!("Query matched {} of {top_k} requested chunks", results.len());
        results
    }

    fn try_load(&self) -> Result<LoadedIndex> {
        let index = FlatIndex::read_from(&self.index_path)?;
        let bundle = MetadataBundle::read_from(&self.metadata_path)?;

        if index.ntotal() != bundle.len() {
            warn!(
                "Index has {} rows but metadata describes {} chunks; extra rows are ignored",
                index.ntotal(),
                bundle.len()
            );
        }

        Ok(LoadedIndex { index, bundle })
    }
}

/// Assemble retrieved chunks into a context block, attributing each chunk to
/// its source file. Chunks are taken in rank order until adding the next one
/// would push the summed block lengths past `max_length`.
#[inline]
pub fn format_context(results: &[SearchResult], max_length: usize) -> String {
    let mut blocks = Vec::new();
    let mut total = 0usize;

    for result in results {
        let block = format!("[Source: {}]\n{}\n", result.metadata.filename, result.chunk.trim());
        if total + block.len() > max_length {
            break;
        }
        total += block.len();
        blocks.push(block);
    }

    blocks.join("\n")
}

/// Wrap the user question in an answering prompt grounded on the retrieved
/// context. An empty context passes the question through unchanged.
#[inline]
pub fn build_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        return query.to_string();
    }

    format!(
        "Use the following context to answer the question. If the context does \
         not contain the answer, say so rather than guessing.\n\n\
         Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}
