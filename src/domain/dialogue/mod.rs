//! Dialogue - Two souls co-hosting a radio conversation.
//!
//! ## Module Structure
//!
//! - `agent` - Agent identities, profiles and per-agent dialogue state
//! - `chunking` - Splitting a generated turn into speakable chunks
//! - `intention` - A pending turn and how much of it was spoken
//! - `audio` - Audio buffers and playback chunks
//! - `question` - Listener questions and their status
//! - `phase` - Orchestrator phases
//! - `events` - Callbacks fired while the dialogue runs
//! - `settings` - Tunables of the loop
//! - `orchestrator` - The turn-taking loop itself

mod agent;
mod audio;
mod chunking;
mod errors;
mod events;
mod intention;
mod orchestrator;
mod phase;
mod question;
mod settings;

pub use agent::{AgentId, AgentProfile, SoulDialogueState, OPENING_SENTINEL};
pub use audio::{estimate_duration_ms, AudioBuffer, AudioChunk, DEFAULT_SAMPLE_RATE};
pub use chunking::{clean, parse_chunks, ChunkedUtterance, CHUNK_DELIMITER};
pub use errors::DialogueError;
pub use events::{DialogueEvent, DialogueEvents, EventLog, NoOpDialogueEvents};
pub use intention::Intention;
pub use orchestrator::{DialogueOrchestrator, DialogueSnapshot, DialogueState, StopHandle};
pub use phase::DialoguePhase;
pub use question::{ListenerQuestion, QuestionStatus};
pub use settings::DialogueSettings;
