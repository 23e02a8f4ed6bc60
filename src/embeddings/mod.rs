// Embeddings module
// This module handles the provider boundary: task types, the Embedder seam,
// retry policy, and the Gemini client

pub mod chunking;
pub mod gemini;
pub mod retry;

pub use chunking::{ChunkingConfig, split_text, strip_markup};
pub use gemini::GeminiClient;
pub use retry::RetryPolicy;

use crate::Result;

/// Task type attached to every embedding request. Providers may optimize
/// indexed-document and query embeddings differently, so the two must never
/// be mixed up even though dimensionality matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Document,
    Query,
}

impl TaskType {
    #[inline]
    pub fn as_api_str(self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Boundary to the embedding provider.
///
/// Implementations must return vectors of uniform dimensionality for a given
/// configuration. Batch calls are retriable independently of single calls.
/// Injected into the ingestion pipeline and the retrieval service so tests
/// can substitute a deterministic double.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>>;
}
