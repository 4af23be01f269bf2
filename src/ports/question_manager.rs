//! Question manager port - Interface to the listener question queue.
//!
//! The orchestrator only consults the queue; submission and moderation live
//! with the implementation.

use async_trait::async_trait;

use crate::domain::dialogue::{AgentId, ListenerQuestion, QuestionStatus};
use crate::domain::foundation::QuestionId;

/// Port consulted by the dialogue loop for listener questions.
#[async_trait]
pub trait QuestionManager: Send + Sync {
    /// Whether enough time has passed to divert into another question.
    async fn can_ask_question(&self) -> bool;

    /// Highest-priority pending question, if any.
    async fn get_next_question(&self) -> Option<ListenerQuestion>;

    /// Marks a question as being discussed.
    async fn mark_addressing(&self, id: QuestionId) -> Result<(), QuestionError>;

    /// Marks a question answered, crediting the agent who answered first.
    async fn mark_answered(&self, id: QuestionId, first_responder: AgentId) -> Result<(), QuestionError>;
}

/// Errors from the question queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuestionError {
    #[error("question not found: {0}")]
    NotFound(QuestionId),

    #[error("question {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: QuestionId,
        from: QuestionStatus,
        to: QuestionStatus,
    },

    #[error("invalid question: {0}")]
    Invalid(String),
}
