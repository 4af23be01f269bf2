//! Speech synthesis adapters.
//!
//! - `ScriptedTtsClient` - Returns a fixed buffer or always fails (tests)
//! - `SilentTtsClient` - Silence sized to the text (command-line runner)

mod scripted;
mod silent;

pub use scripted::ScriptedTtsClient;
pub use silent::SilentTtsClient;
