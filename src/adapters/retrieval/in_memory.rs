//! Keyword-overlap retriever over documents held in memory.
//!
//! Scores each document by the fraction of distinct query keywords it
//! contains. Words shorter than four characters are ignored on both sides.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::ports::{RetrievalError, RetrievedChunk, Retriever};

const MIN_KEYWORD_LEN: usize = 4;

#[derive(Debug, Clone)]
struct Document {
    source: String,
    content: String,
    keywords: HashSet<String>,
}

/// In-memory implementation of the Retriever port.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetriever {
    documents: Vec<Document>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document under `source`.
    pub fn with_document(mut self, source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        self.documents.push(Document {
            source: source.into(),
            keywords: keywords(&content),
            content,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let wanted = keywords(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<RetrievedChunk> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let overlap = wanted.intersection(&doc.keywords).count();
                (overlap > 0).then(|| RetrievedChunk {
                    source: doc.source.clone(),
                    content: doc.content.clone(),
                    score: overlap as f32 / wanted.len() as f32,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}
