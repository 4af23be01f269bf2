//! Error types for cognitive steps

use crate::domain::memory::MemoryError;
use crate::ports::AIError;

/// Cognitive step errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    /// No usable provider. Fatal; never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(#[from] AIError),

    #[error("Step {step} could not process output: {reason}")]
    PostProcess { step: String, reason: String },

    #[error("Step {step} ended before producing a result")]
    StreamClosed { step: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl StepError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn post_process(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PostProcess {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// True for the operator-facing configuration failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StepError::Configuration(_))
    }
}
