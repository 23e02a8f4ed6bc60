
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Configuration for document chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks, in characters
    pub chunk_overlap: usize,
    /// Chunks at or below this trimmed length are discarded
    pub min_chunk_len: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_len: 50,
        }
    }
}

/// Separator preference order: paragraph break, line break, sentence
/// boundary, word boundary, then hard cut.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Strip structural markup characters (heading and emphasis markers) so the
/// splitter works on plain prose.
#[inline]
pub fn strip_markup(text: &str) -> String {
    text.replace(['#', '*'], "")
}

/// Split text into overlapping chunks, preferring natural language
/// boundaries. Deterministic for a fixed configuration: the same input
/// always yields the same chunk sequence.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    split_with_separators(text, &SEPARATORS, config)
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Recursive splitting: break on the first separator present in the text,
/// re-split oversized pieces with the remaining separators, then merge small
/// pieces back into chunks with overlap.
fn split_with_separators(
    text: &str,
    separators: &[&str],
    config: &ChunkingConfig,
) -> Vec<String> {
    let (separator, remaining) = separators
        .iter()
        .position(|sep| text.contains(sep))
        .map_or((None, &[][..]), |i| (Some(separators[i]), &separators[i + 1..]));

    let splits = match separator {
        Some(sep) => split_keeping_separator(text, sep),
        None => hard_cut(text, config.chunk_size),
    };

    let mut chunks = Vec::new();
    let mut good_splits: Vec<String> = Vec::new();

    for split in splits {
        if split.len() <= config.chunk_size {
            good_splits.push(split);
        } else {
            // Flush accumulated small pieces before recursing into the
            // oversized one, preserving document order.
            if !good_splits.is_empty() {
                chunks.extend(merge_splits(&good_splits, config));
                good_splits.clear();
            }

            if remaining.is_empty() {
                chunks.extend(hard_cut(&split, config.chunk_size));
            } else {
                chunks.extend(split_with_separators(&split, remaining, config));
            }
        }
    }

    if !good_splits.is_empty() {
        chunks.extend(merge_splits(&good_splits, config));
    }

    chunks
}

/// Split on a separator, keeping the separator attached to the piece before
/// it so merged chunks read naturally.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while let Some(pos) = text.get(start..).and_then(|rest| rest.find(separator)) {
        let end = start + pos + separator.len();
        if let Some(piece) = text.get(start..end) {
            pieces.push(piece.to_string());
        }
        start = end;
    }

    if start < text.len() {
        if let Some(piece) = text.get(start..) {
            pieces.push(piece.to_string());
        }
    }

    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Last-resort split at fixed width, respecting UTF-8 boundaries.
fn hard_cut(text: &str, width: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if current.len() + ch.len_utf8() > width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Greedily merge pieces into chunks up to `chunk_size`, carrying up to
/// `chunk_overlap` characters of trailing pieces into the next chunk.
fn merge_splits(splits: &[String], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let len = split.len();

        if total + len > config.chunk_size && !window.is_empty() {
            push_window(&mut chunks, &window);

            while total > config.chunk_overlap
                || (total + len > config.chunk_size && total > 0)
            {
                if let Some(dropped) = window.pop_front() {
                    total -= dropped.len();
                } else {
                    break;
                }
            }
        }

        window.push_back(split);
        total += len;
    }

    if !window.is_empty() {
        push_window(&mut chunks, &window);
    }

    chunks
}

fn push_window(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
