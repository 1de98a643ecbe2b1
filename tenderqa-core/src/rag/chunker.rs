//! Text chunking for RAG.
//!
//! Splits extracted document text into overlapping, fixed-size windows.
//! Sizes and offsets are counted in characters (Unicode scalar values), so
//! multi-byte text never splits inside a character.

use super::types::Chunk;
use crate::config::RagConfig;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors raised for invalid chunking parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be positive")]
    ZeroChunkSize,

    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Splits text into overlapping chunks with stable per-source indices.
///
/// Texts shorter than `chunk_size` (after trimming) become a single chunk.
/// Longer texts are cut with a sliding window; every window but the last
/// tries to end on the last whitespace inside its overlap zone so words
/// are not split when it can be avoided.
///
/// # Example
///
/// ```no_run
/// # use tenderqa_core::rag::Chunker;
/// let chunker = Chunker::new(10, 3).unwrap();
/// let chunks = chunker.split("AAAA BBBB CCCC DDDD", "notes.txt");
/// assert_eq!(chunks.len(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge { chunk_size, overlap });
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self, ChunkerError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into chunks attributed to `source_id`.
    ///
    /// Blank input yields no chunks. Windows whose content is blank after
    /// trimming are dropped without consuming a chunk index.
    pub fn split(&self, text: &str, source_id: &str) -> Vec<Chunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!(source = source_id, "Blank text, no chunks created");
            return Vec::new();
        }

        let trimmed_len = trimmed.chars().count();
        if trimmed_len < self.chunk_size {
            let leading = text.len() - text.trim_start().len();
            let start_char = text[..leading].chars().count();
            let chunk = Chunk::new(generate_chunk_id(trimmed, source_id, 0), trimmed, source_id, 0)
                .with_metadata("chunk_type", "single")
                .with_metadata("start_char", start_char)
                .with_metadata("end_char", start_char + trimmed_len)
                .with_metadata("text_length", trimmed_len);
            return vec![chunk];
        }

        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();

        for (start, end) in chunk_spans(&chars, self.chunk_size, self.overlap) {
            let window: String = chars[start..end].iter().collect();
            let content = window.trim();
            if content.is_empty() {
                continue;
            }

            let chunk_index = chunks.len();
            let text_length = content.chars().count();
            chunks.push(
                Chunk::new(generate_chunk_id(content, source_id, chunk_index), content, source_id, chunk_index)
                    .with_metadata("chunk_type", "split")
                    .with_metadata("start_char", start)
                    .with_metadata("end_char", end)
                    .with_metadata("text_length", text_length),
            );
        }

        debug!(source = source_id, count = chunks.len(), "Chunks created");
        chunks
    }
}

/// Computes the `[start, end)` character windows for a text.
///
/// Each window starts `overlap` characters before the previous one ended.
/// When that would not move forward (whitespace snapping pulled the end
/// back too far), the next window starts at the previous end instead.
/// The window reaching the end of the text is always the last one.
pub(crate) fn chunk_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let window_start = end.saturating_sub(overlap).max(start);
            if let Some(pos) = (window_start..end).rev().find(|&i| chars[i].is_whitespace()) {
                if pos > start {
                    end = pos;
                }
            }
        }

        spans.push((start, end));

        if end >= len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    spans
}

/// Builds a chunk identifier from content, source and index plus a random suffix.
///
/// The hash part is reproducible; the suffix makes ids unique per indexing run.
pub fn generate_chunk_id(content: &str, source_file: &str, chunk_index: usize) -> String {
    let prefix: String = content.chars().take(100).collect();
    let digest = Sha256::digest(format!("{}_{}_{}", prefix, source_file, chunk_index).as_bytes());
    let hash = format!("{:x}", digest);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("chunk_{}_{}", &hash[..32], &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(chunk: &Chunk) -> (usize, usize) {
        let start = chunk.metadata["start_char"].as_u64().unwrap() as usize;
        let end = chunk.metadata["end_char"].as_u64().unwrap() as usize;
        (start, end)
    }

    fn sample_text(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{}", i % 17).repeat(1 + i % 3))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_eq!(Chunker::new(0, 0).unwrap_err(), ChunkerError::ZeroChunkSize);
        assert!(matches!(Chunker::new(10, 10), Err(ChunkerError::OverlapTooLarge { .. })));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = chunker.split("  Hello  ", "a.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].metadata["chunk_type"], "single");
        assert_eq!(span_of(&chunks[0]), (2, 7));
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(chunker.split("", "a.txt").is_empty());
        assert!(chunker.split(" \n\t ", "a.txt").is_empty());
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = chunker.split("0123456789ABCDEF", "a.txt");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "0123456789");
        assert_eq!(chunks[1].content, "89ABCDEF");
    }

    #[test]
    fn test_four_words_reconstruct() {
        let text = "AAAA BBBB CCCC DDDD";
        let chunker = Chunker::new(10, 3).unwrap();
        let chunks = chunker.split(text, "a.txt");

        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].content, "AAAA BBBB");

        let chars: Vec<char> = text.chars().collect();
        let mut rebuilt = String::new();
        let mut covered = 0;
        for chunk in &chunks {
            let (start, end) = span_of(chunk);
            assert!(start <= covered);
            rebuilt.extend(&chars[covered..end]);
            covered = end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_progress_and_exact_overlap() {
        let text = sample_text(400);
        let chars: Vec<char> = text.chars().collect();

        for (size, overlap) in [(50, 10), (64, 0), (100, 40), (30, 29), (7, 3)] {
            let spans = chunk_spans(&chars, size, overlap);
            assert_eq!(spans.last().unwrap().1, chars.len());
            assert_eq!(spans[0].0, 0);

            for pair in spans.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                assert!(next.0 > prev.0, "start must strictly increase");
                assert!(prev.1 - prev.0 <= size);
                let shared = prev.1 - next.0;
                assert!(shared == overlap || next.0 == prev.1, "overlap was {}", shared);
            }
        }
    }

    #[test]
    fn test_split_is_deterministic_except_ids() {
        let text = sample_text(200);
        let chunker = Chunker::new(80, 20).unwrap();
        let first = chunker.split(&text, "a.txt");
        let second = chunker.split(&text, "a.txt");

        let view = |chunks: &[Chunk]| {
            chunks
                .iter()
                .map(|c| (c.content.clone(), c.chunk_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(view(&first), view(&second));
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn test_indices_are_contiguous() {
        let text = sample_text(300);
        let chunks = Chunker::new(60, 15).unwrap().split(&text, "a.txt");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.source_file, "a.txt");
            assert_eq!(chunk.metadata["chunk_type"], "split");
        }
    }

    #[test]
    fn test_large_overlap_terminates() {
        let text = "a b c d e f g h i j k l m n o p";
        let spans = chunk_spans(&text.chars().collect::<Vec<_>>(), 4, 3);
        assert!(spans.len() <= text.len());
        assert_eq!(spans.last().unwrap().1, text.chars().count());
    }

    #[test]
    fn test_multibyte_text() {
        let text = "éléphant façade naïve coöperate ".repeat(10);
        let chunks = Chunker::new(25, 5).unwrap().split(&text, "fr.txt");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 25));
    }

    #[test]
    fn test_chunk_id_format() {
        let id = generate_chunk_id("content", "a.txt", 3);
        assert!(id.starts_with("chunk_"));
        assert_eq!(id.len(), "chunk_".len() + 32 + 1 + 8);

        let other = generate_chunk_id("content", "a.txt", 3);
        assert_eq!(id[..38], other[..38]);
        assert_ne!(id, other);
    }
}
