
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TARGET_CHARS: usize = 500;
pub const DEFAULT_MIN_CHARS: usize = 100;

/// A fragment of page text that survived length filtering but has no id yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCandidate {
    /// Trimmed fragment text
    pub text: String,
    /// Identifier of the source document, usually its file name
    pub source: String,
    /// 1-based page number within the source document
    pub page: u32,
    /// Length of `text` in characters
    pub length: usize,
}

/// A chunk that has been accepted into a knowledge store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique id, increasing in ingestion order
    pub id: u64,
    pub text: String,
    pub source: String,
    pub page: u32,
    pub length: usize,
}

impl ChunkCandidate {
    #[inline]
    pub fn into_chunk(self, id: u64) -> Chunk {
        Chunk {
            id,
            text: self.text,
            source: self.source,
            page: self.page,
            length: self.length,
        }
    }
}

/// Configuration for page chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters; the last window of a page may be shorter
    pub target_chars: usize,
    /// Fragments whose trimmed length is at or below this are dropped
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chars: DEFAULT_TARGET_CHARS,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

/// Split one page of text into fixed, non-overlapping character windows.
///
/// Each window is trimmed and kept only if it is longer than
/// `config.min_chars` characters. Windows never split a UTF-8 character.
#[inline]
pub fn chunk_page(
    text: &str,
    source: &str,
    page: u32,
    config: &ChunkingConfig,
) -> Vec<ChunkCandidate> {
    let mut candidates = Vec::new();
    let mut dropped = 0_usize;

    for window in CharWindows::new(text, config.target_chars) {
        let trimmed = window.trim();
        let length = trimmed.chars().count();
        if length <= config.min_chars {
            dropped += 1;
            continue;
        }

        candidates.push(ChunkCandidate {
            text: trimmed.to_string(),
            source: source.to_string(),
            page,
            length,
        });
    }

    debug!(
        "Chunked '{}' page {} into {} chunks ({} short fragments dropped)",
        source,
        page,
        candidates.len(),
        dropped
    );

    candidates
}

/// Iterator over consecutive slices of at most `size` characters
struct CharWindows<'a> {
    rest: &'a str,
    size: usize,
}

impl<'a> CharWindows<'a> {
    fn new(text: &'a str, size: usize) -> Self {
        Self {
            rest: text,
            size: size.max(1),
        }
    }
}

impl<'a> Iterator for CharWindows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let end = self
            .rest
            .char_indices()
            .nth(self.size)
            .map_or(self.rest.len(), |(offset, _)| offset);
        let (window, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(window)
    }
}
