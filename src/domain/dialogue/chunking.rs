//! Splitting a model response into speakable chunks.
//!
//! The chunked-dialogue prompt asks for `|` at natural pause points. Models
//! occasionally forget, so text without a delimiter falls back to sentence
//! boundaries.

use serde::{Deserialize, Serialize};

/// Pause-point marker inside a raw chunked response.
pub const CHUNK_DELIMITER: char = '|';

/// A parsed chunked utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedUtterance {
    /// Model output including delimiters.
    pub raw: String,
    /// Trimmed, non-empty segments in speaking order.
    pub chunks: Vec<String>,
    /// Delimiter-free text for transcripts.
    pub cleaned: String,
}

impl ChunkedUtterance {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let chunks = parse_chunks(&raw);
        let cleaned = clean(&chunks);
        Self { raw, chunks, cleaned }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Splits raw text into trimmed non-empty chunks.
pub fn parse_chunks(raw: &str) -> Vec<String> {
    if raw.contains(CHUNK_DELIMITER) {
        return raw
            .split(CHUNK_DELIMITER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    split_sentences(raw)
}

/// Joins chunks with single spaces.
pub fn clean(chunks: &[String]) -> String {
    chunks.join(" ")
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(true, |next| next.is_whitespace());
        if at_boundary {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
