
use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{RagError, Result};

const INDEX_MAGIC: [u8; 4] = *b"KBFI";
const HEADER_LEN: usize = 4 + 4 + 8;

/// Exact inner-product similarity index over fixed-dimensionality rows.
///
/// Row `i` always corresponds to `chunks[i]` and `metadata[i]` in the
/// metadata bundle persisted alongside the index; rows are only ever
/// appended, never reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// Provenance for one indexed chunk. `chunk_id` is contiguous per source
/// document starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub filename: String,
    pub chunk_id: usize,
    pub source: String,
}

/// Chunk texts and metadata persisted next to the index, in index row
/// order. `total_chunks` is redundant and checked on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetadataBundle {
    pub chunks: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub total_chunks: usize,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Index(
                "Index dimension must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows
    #[inline]
    pub fn ntotal(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Append one row. Rows keep their insertion order forever.
    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Index(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Top-k inner-product search. Results are sorted by descending score;
    /// ties keep insertion order. At most `top_k` results are returned.
    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::Index(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, stored)| (row, dot(query, stored)))
            .collect();

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored)
    }

    /// Persist to a single binary file: magic, dimension, row count, then
    /// row-major little-endian f32 data. Written via temp file + rename so
    /// a partial file is never observable.
    #[inline]
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(&INDEX_MAGIC);
        bytes.extend_from_slice(&u32::try_from(self.dimension).unwrap_or(u32::MAX).to_le_bytes());
        bytes.extend_from_slice(&(self.ntotal() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        write_atomic(path, &bytes)
            .with_context(|| format!("Failed to write index file: {}", path.display()))?;

        info!(
            "Saved index with {} vectors of dimension {} to {}",
            self.ntotal(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    #[inline]
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;

        if bytes.len() < HEADER_LEN || bytes[..4] != INDEX_MAGIC {
            return Err(RagError::Index(format!(
                "Not a valid index file: {}",
                path.display()
            )));
        }

        let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let ntotal = u64::from_le_bytes([
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        ]) as usize;

        if dimension == 0 {
            return Err(RagError::Index(format!(
                "Index file has zero dimension: {}",
                path.display()
            )));
        }

        let body = &bytes[HEADER_LEN..];
        if body.len() != dimension * ntotal * 4 {
            return Err(RagError::Index(format!(
                "Index file is truncated or corrupt: {}",
                path.display()
            )));
        }

        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        debug!(
            "Loaded index with {} vectors of dimension {}",
            ntotal, dimension
        );

        Ok(Self { dimension, data })
    }
}

impl MetadataBundle {
    #[inline]
    pub fn new(chunks: Vec<String>, metadata: Vec<ChunkMetadata>) -> Result<Self> {
        if chunks.len() != metadata.len() {
            return Err(RagError::Index(format!(
                "Chunk count ({}) does not match metadata count ({})",
                chunks.len(),
                metadata.len()
            )));
        }

        let total_chunks = chunks.len();
        Ok(Self {
            chunks,
            metadata,
            total_chunks,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self).context("Failed to serialize metadata bundle")?;

        write_atomic(path, &json)
            .with_context(|| format!("Failed to write metadata file: {}", path.display()))?;

        info!("Saved metadata for {} chunks to {}", self.len(), path.display());
        Ok(())
    }

    #[inline]
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;

        let bundle: MetadataBundle =
            serde_json::from_str(&content).context("Failed to parse metadata bundle")?;

        if bundle.chunks.len() != bundle.metadata.len()
            || bundle.chunks.len() != bundle.total_chunks
        {
            return Err(RagError::Index(format!(
                "Metadata bundle is inconsistent: {} chunks, {} metadata entries, total_chunks {}",
                bundle.chunks.len(),
                bundle.metadata.len(),
                bundle.total_chunks
            )));
        }

        debug!("Loaded metadata for {} chunks", bundle.len());
        Ok(bundle)
    }
}

/// Scale a vector to unit L2 norm in place. Norm-zero vectors are left
/// untouched so degraded rows never rank above a positive threshold.
#[inline]
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = dot(vector, vector).sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Write-then-rename so readers never observe a half-written artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)
}
