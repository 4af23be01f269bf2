//! Listener question queue adapters.

mod in_memory;

pub use in_memory::InMemoryQuestionManager;
