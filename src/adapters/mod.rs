//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `ai` - LLM providers and usage tracking
//! - `tts` - Speech synthesis
//! - `questions` - Listener question queue
//! - `retrieval` - Knowledge store
//! - `image` - Image generation

pub mod ai;
pub mod image;
pub mod questions;
pub mod retrieval;
pub mod tts;
