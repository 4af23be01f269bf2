//! In-memory question queue for tests and the command-line runner.
//!
//! Listener questions wait in a single list. The next question is the pending
//! one with the most upvotes; ties go to whoever asked first.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::dialogue::{AgentId, ListenerQuestion, QuestionStatus};
use crate::domain::foundation::QuestionId;
use crate::ports::{QuestionError, QuestionManager};

/// In-memory implementation of the QuestionManager port.
#[derive(Debug, Clone)]
pub struct InMemoryQuestionManager {
    /// Minimum spacing between two diversions into questions.
    min_interval: Duration,
    state: Arc<RwLock<QueueState>>,
}

#[derive(Debug, Default)]
struct QueueState {
    questions: Vec<ListenerQuestion>,
    last_addressed_at: Option<Instant>,
}

impl InMemoryQuestionManager {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Arc::new(RwLock::new(QueueState::default())),
        }
    }

    /// Queues a new listener question.
    pub async fn submit(
        &self,
        question: impl Into<String>,
        submitted_by: Option<String>,
    ) -> Result<ListenerQuestion, QuestionError> {
        let question = ListenerQuestion::new(question, submitted_by)
            .map_err(|e| QuestionError::Invalid(e.to_string()))?;
        debug!(question_id = %question.id, "Listener question submitted");

        self.state.write().await.questions.push(question.clone());
        Ok(question)
    }

    /// Adds one upvote; returns the new count.
    pub async fn upvote(&self, id: QuestionId) -> Result<u32, QuestionError> {
        let mut state = self.state.write().await;
        let question = state.find_mut(id)?;
        question.upvotes += 1;
        Ok(question.upvotes)
    }

    pub async fn get(&self, id: QuestionId) -> Option<ListenerQuestion> {
        self.state.read().await.questions.iter().find(|q| q.id == id).cloned()
    }

    /// Pending questions in the order they would be asked.
    pub async fn pending(&self) -> Vec<ListenerQuestion> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state.questions.iter().filter(|q| q.is_pending()).cloned().collect();
        pending.sort_by(|a, b| {
            b.upvotes
                .cmp(&a.upvotes)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        });
        pending
    }
}

impl QueueState {
    fn find_mut(&mut self, id: QuestionId) -> Result<&mut ListenerQuestion, QuestionError> {
        self.questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(QuestionError::NotFound(id))
    }
}

fn invalid_transition(id: QuestionId, from: QuestionStatus, to: QuestionStatus) -> QuestionError {
    QuestionError::InvalidTransition { id, from, to }
}

#[async_trait]
impl QuestionManager for InMemoryQuestionManager {
    async fn can_ask_question(&self) -> bool {
        match self.state.read().await.last_addressed_at {
            Some(at) => at.elapsed() >= self.min_interval,
            None => true,
        }
    }

    async fn get_next_question(&self) -> Option<ListenerQuestion> {
        self.pending().await.into_iter().next()
    }

    async fn mark_addressing(&self, id: QuestionId) -> Result<(), QuestionError> {
        let mut state = self.state.write().await;
        let question = state.find_mut(id)?;
        question
            .start_addressing()
            .map_err(|e| invalid_transition(id, e.from, e.to))?;
        state.last_addressed_at = Some(Instant::now());
        Ok(())
    }

    async fn mark_answered(&self, id: QuestionId, first_responder: AgentId) -> Result<(), QuestionError> {
        let mut state = self.state.write().await;
        let question = state.find_mut(id)?;
        question
            .answer(first_responder)
            .map_err(|e| invalid_transition(id, e.from, e.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_question_prefers_upvotes_then_age() {
        let manager = InMemoryQuestionManager::new(Duration::ZERO);
        let first = manager.submit("Who built the maze?", None).await.unwrap();
        let second = manager.submit("Why bronze?", None).await.unwrap();
        let third = manager.submit("Is the forge hot?", None).await.unwrap();

        assert_eq!(manager.get_next_question().await.unwrap().id, first.id);

        manager.upvote(third.id).await.unwrap();
        assert_eq!(manager.upvote(third.id).await.unwrap(), 2);
        manager.upvote(second.id).await.unwrap();

        let order: Vec<_> = manager.pending().await.into_iter().map(|q| q.id).collect();
        assert_eq!(order, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn blank_question_is_invalid() {
        let manager = InMemoryQuestionManager::new(Duration::ZERO);

        assert!(matches!(manager.submit("  ", None).await, Err(QuestionError::Invalid(_))));
    }

    #[tokio::test]
    async fn lifecycle_moves_through_addressing_to_answered() {
        let manager = InMemoryQuestionManager::new(Duration::ZERO);
        let q = manager.submit("Was the labyrinth real?", Some("ariadne".into())).await.unwrap();

        manager.mark_addressing(q.id).await.unwrap();
        assert!(manager.get_next_question().await.is_none());

        manager.mark_answered(q.id, AgentId::B).await.unwrap();
        let answered = manager.get(q.id).await.unwrap();
        assert_eq!(answered.status, QuestionStatus::Answered);
        assert_eq!(answered.answered_by, Some(AgentId::B));
    }

    #[tokio::test]
    async fn answering_a_pending_question_is_rejected() {
        let manager = InMemoryQuestionManager::new(Duration::ZERO);
        let q = manager.submit("Why bulls?", None).await.unwrap();

        let err = manager.mark_answered(q.id, AgentId::A).await.unwrap_err();

        assert_eq!(
            err,
            QuestionError::InvalidTransition {
                id: q.id,
                from: QuestionStatus::Pending,
                to: QuestionStatus::Answered,
            }
        );
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let manager = InMemoryQuestionManager::new(Duration::ZERO);
        let id = QuestionId::new();

        assert_eq!(manager.upvote(id).await, Err(QuestionError::NotFound(id)));
        assert_eq!(manager.mark_addressing(id).await, Err(QuestionError::NotFound(id)));
    }

    #[tokio::test]
    async fn min_interval_spaces_out_questions() {
        let manager = InMemoryQuestionManager::new(Duration::from_millis(40));
        let q = manager.submit("What is a soul?", None).await.unwrap();

        assert!(manager.can_ask_question().await);
        manager.mark_addressing(q.id).await.unwrap();
        assert!(!manager.can_ask_question().await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.can_ask_question().await);
    }
}
