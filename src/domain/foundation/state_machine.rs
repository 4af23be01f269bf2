//! State machine trait for lifecycle enums.
//!
//! Gives phase enums (dialogue phases, question statuses) one shared way to
//! validate and perform transitions.

use std::fmt::Debug;
use thiserror::Error;

/// Rejected transition between two states of the same machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot transition from {from:?} to {to:?}")]
pub struct TransitionError<S: Debug> {
    pub from: S,
    pub to: S,
}

/// Trait for enums that represent state machines.
///
/// Implementors list their legal edges; validated transitions come for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for QuestionStatus {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Pending => vec![Addressing],
///             Addressing => vec![Answered, Pending],
///             Answered => vec![],
///         }
///     }
/// }
///
/// status.advance(QuestionStatus::Addressing)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + Debug {
    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Performs transition with validation, returning the new state.
    fn transition_to(&self, target: Self) -> Result<Self, TransitionError<Self>> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(TransitionError {
                from: *self,
                to: target,
            })
        }
    }

    /// Validates and applies a transition in place.
    fn advance(&mut self, target: Self) -> Result<(), TransitionError<Self>> {
        *self = self.transition_to(target)?;
        Ok(())
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
