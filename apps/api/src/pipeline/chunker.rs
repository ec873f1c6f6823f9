//! Chunker: fixed-size overlapping character windows used as the unit of embedding.

use serde::{Deserialize, Serialize};

use crate::pipeline::loader::ParsedDocument;
use crate::pipeline::PipelineError;

pub const DEFAULT_TARGET_LEN: usize = 500;
pub const DEFAULT_OVERLAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub source_order: usize,
}

/// Window parameters. Lengths are counted in chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    target_len: usize,
    overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_len: DEFAULT_TARGET_LEN,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(target_len: usize, overlap: usize) -> Result<Self, PipelineError> {
        if target_len == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk target length must be positive".to_string(),
            ));
        }
        if overlap >= target_len {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than target length ({target_len})"
            )));
        }
        Ok(Self {
            target_len,
            overlap,
        })
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.target_len - self.overlap
    }
}

pub fn chunk(document: &ParsedDocument, config: &ChunkConfig) -> Vec<TextChunk> {
    chunk_text(&document.text(), config)
}

pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = (start + config.target_len).min(total);
        chunks.push(TextChunk {
            text: chars[start..end].iter().collect(),
            source_order: chunks.len(),
        });
        if end == total {
            break;
        }
        start += config.step();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("Jane Doe, Rust engineer", &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Jane Doe, Rust engineer");
        assert_eq!(chunks[0].source_order, 0);
    }

    #[test]
    fn test_windows_overlap_by_fifty_chars() {
        let text: String = (0..1200).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, &ChunkConfig::default());

        // starts at 0, 450, 900; the last one runs to 1200
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 500);
        assert_eq!(chunks[1].text.len(), 500);
        assert_eq!(chunks[2].text.len(), 300);
        assert_eq!(&chunks[0].text[450..], &chunks[1].text[..50]);
        assert_eq!(
            chunks.iter().map(|c| c.source_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_exact_target_length_is_single_chunk() {
        let text = "x".repeat(500);
        assert_eq!(chunk_text(&text, &ChunkConfig::default()).len(), 1);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Experience at Acme. ".repeat(80);
        let config = ChunkConfig::default();
        assert_eq!(chunk_text(&text, &config), chunk_text(&text, &config));
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(700);
        let chunks = chunk_text(&text, &ChunkConfig::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 500);
        assert_eq!(chunks[1].text.chars().count(), 250);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_target() {
        assert!(ChunkConfig::new(100, 100).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_chunk_uses_links_section_of_document() {
        let doc = ParsedDocument::new(
            vec!["Jane".to_string()],
            vec!["https://github.com/jdoe".to_string()],
        );
        let chunks = chunk(&doc, &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("https://github.com/jdoe"));
    }
}
