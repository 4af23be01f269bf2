//! Retriever port - Interface to the knowledge store.
//!
//! Returns ranked text chunks for a query. How the ranking happens (vector
//! similarity, keywords) is the implementation's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One ranked piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Where the text came from (document title or path).
    pub source: String,
    /// The chunk text.
    pub content: String,
    /// Relevance, higher is better.
    pub score: f32,
}

/// Port for knowledge retrieval.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns at most `limit` chunks, best first.
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Errors from the knowledge store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
