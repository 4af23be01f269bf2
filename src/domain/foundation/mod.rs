//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and error types
//! that form the vocabulary of the soul engine.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{ChunkId, EntryId, QuestionId, SessionId};
pub use state_machine::{StateMachine, TransitionError};
pub use timestamp::Timestamp;
