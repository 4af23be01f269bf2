use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::chunking::ChunkedUtterance;

/// One turn an agent intends to speak, and how far it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    pub full_response: String,
    pub cleaned: String,
    pub chunks: Vec<String>,
    pub vocalized_chunks: usize,
    pub created_at: Timestamp,
    pub interrupted_at: Option<usize>,
    pub interruption_context: Option<String>,
}

impl Intention {
    pub fn from_utterance(utterance: ChunkedUtterance) -> Self {
        Self {
            full_response: utterance.raw,
            cleaned: utterance.cleaned,
            chunks: utterance.chunks,
            vocalized_chunks: 0,
            created_at: Timestamp::now(),
            interrupted_at: None,
            interruption_context: None,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: usize) -> Option<&str> {
        self.chunks.get(index).map(String::as_str)
    }

    /// Next chunk to speak, if any remain.
    pub fn current_chunk(&self) -> Option<&str> {
        self.chunk(self.vocalized_chunks)
    }

    /// Chunks spoken so far, joined.
    pub fn vocalized_text(&self) -> String {
        self.chunks[..self.vocalized_chunks.min(self.chunks.len())].join(" ")
    }

    /// Chunks never spoken, joined. Empty once the turn completed.
    pub fn unspoken_text(&self) -> String {
        self.chunks
            .get(self.vocalized_chunks..)
            .map(|rest| rest.join(" "))
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.vocalized_chunks >= self.chunks.len()
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted_at.is_some()
    }

    pub(crate) fn mark_vocalized(&mut self) {
        if self.vocalized_chunks < self.chunks.len() {
            self.vocalized_chunks += 1;
        }
    }

    pub(crate) fn mark_interrupted(&mut self, at: usize, context: impl Into<String>) {
        self.interrupted_at = Some(at);
        self.interruption_context = Some(context.into());
    }
}
