//! Working Memory Domain Module
//!
//! Immutable conversation state shared by every soul: dated entries, named
//! regions for framing and retrieved knowledge, compression of older history,
//! and a completion signal for streaming steps.

pub mod entry;
pub mod errors;
pub mod region;
pub mod working_memory;

pub use entry::*;
pub use errors::*;
pub use region::*;
pub use working_memory::*;
