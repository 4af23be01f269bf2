//! Soul - The portfolio persona chatting with visitors.
//!
//! ## Module Structure
//!
//! - `session` - `SoulSession`, one visitor's conversation
//! - `vision` - Per-session image generation budget
//! - `errors` - `SoulError`

mod errors;
mod session;
mod vision;

pub use errors::SoulError;
pub use session::{SoulReply, SoulSession, SoulSettings, VisitorIntent};
pub use vision::{VisionBudget, VisionDecision};
