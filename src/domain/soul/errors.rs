//! Error types for the visitor chat soul

use crate::domain::cognitive::StepError;
use crate::domain::foundation::ValidationError;
use crate::domain::memory::MemoryError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SoulError {
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Cognitive step failed: {0}")]
    Step(#[from] StepError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
