//! Error types for working memory operations

use crate::domain::foundation::ValidationError;

/// Working memory errors
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MemoryError {
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("Region {0} is persistent and cannot be compressed")]
    NotCompressible(String),

    #[error("Duplicate region in layout: {0}")]
    DuplicateRegion(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
