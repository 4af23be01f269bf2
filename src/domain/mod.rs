//! Domain layer containing the soul engine's logic and types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, state machines, errors)
//! - `memory` - Immutable working memory with regions
//! - `cognitive` - Cognitive steps and the provider registry they run against
//! - `dialogue` - Two-agent radio dialogue with interruptions
//! - `soul` - Visitor chat persona

pub mod cognitive;
pub mod dialogue;
pub mod foundation;
pub mod memory;
pub mod soul;
