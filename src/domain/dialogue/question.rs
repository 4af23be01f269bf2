//! Listener questions submitted while the radio dialogue runs.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{QuestionId, StateMachine, Timestamp, TransitionError, ValidationError};

use super::agent::AgentId;

/// Lifecycle of a listener question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Addressing,
    Answered,
}

impl StateMachine for QuestionStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use QuestionStatus::*;
        match self {
            Pending => vec![Addressing],
            // Back to pending when the discussion is abandoned.
            Addressing => vec![Answered, Pending],
            Answered => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerQuestion {
    pub id: QuestionId,
    pub question: String,
    pub submitted_at: Timestamp,
    pub submitted_by: Option<String>,
    pub upvotes: u32,
    pub status: QuestionStatus,
    pub answered_by: Option<AgentId>,
}

impl ListenerQuestion {
    pub fn new(question: impl Into<String>, submitted_by: Option<String>) -> Result<Self, ValidationError> {
        let question = question.into().trim().to_string();
        if question.is_empty() {
            return Err(ValidationError::empty_field("question"));
        }
        Ok(Self {
            id: QuestionId::new(),
            question,
            submitted_at: Timestamp::now(),
            submitted_by,
            upvotes: 0,
            status: QuestionStatus::Pending,
            answered_by: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == QuestionStatus::Pending
    }

    pub fn start_addressing(&mut self) -> Result<(), TransitionError<QuestionStatus>> {
        self.status.advance(QuestionStatus::Addressing)
    }

    pub fn answer(&mut self, first_responder: AgentId) -> Result<(), TransitionError<QuestionStatus>> {
        self.status.advance(QuestionStatus::Answered)?;
        self.answered_by = Some(first_responder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_question_is_pending_and_trimmed() {
        let q = ListenerQuestion::new("  Who built the maze?  ", Some("ariadne".into())).unwrap();

        assert_eq!(q.question, "Who built the maze?");
        assert!(q.is_pending());
        assert_eq!(q.upvotes, 0);
    }

    #[test]
    fn blank_question_is_rejected() {
        assert!(ListenerQuestion::new("   ", None).is_err());
    }

    #[test]
    fn answer_requires_addressing_first() {
        let mut q = ListenerQuestion::new("Why bulls?", None).unwrap();

        assert!(q.answer(AgentId::A).is_err());
        q.start_addressing().unwrap();
        q.answer(AgentId::B).unwrap();

        assert_eq!(q.status, QuestionStatus::Answered);
        assert_eq!(q.answered_by, Some(AgentId::B));
        assert!(q.status.is_terminal());
    }

    #[test]
    fn addressing_can_return_to_pending() {
        assert!(QuestionStatus::Addressing.can_transition_to(&QuestionStatus::Pending));
        assert!(!QuestionStatus::Pending.can_transition_to(&QuestionStatus::Answered));
    }
}
