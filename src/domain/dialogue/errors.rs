//! Error types for the dialogue orchestrator

use crate::domain::cognitive::StepError;
use crate::domain::foundation::{TransitionError, ValidationError};

use super::phase::DialoguePhase;

/// Dialogue orchestrator errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DialogueError {
    #[error("Dialogue has not been started")]
    NotStarted,

    #[error("Invalid dialogue phase change: {0}")]
    InvalidPhase(#[from] TransitionError<DialoguePhase>),

    /// A model call failed; fatal to this dialogue run.
    #[error("Cognitive step failed: {0}")]
    Step(#[from] StepError),

    #[error("Invalid dialogue setup: {0}")]
    Invalid(#[from] ValidationError),
}
