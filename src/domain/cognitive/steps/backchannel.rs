//! Short listener acknowledgments ("mm", "right") that do not take the floor.

use crate::domain::cognitive::step::{create_cognitive_step, CognitiveStep, StepSpec};
use crate::domain::memory::MemoryEntry;

use super::parse::unquote;

pub const BACKCHANNEL: &str = "backchannel";

/// Model output meaning "say nothing".
pub const BACKCHANNEL_SENTINEL: &str = "...";

#[derive(Debug, Clone)]
pub struct BackchannelContext {
    pub listener: String,
    pub speaker: String,
    pub chunk: String,
    /// Anything longer is an interjection, not a backchannel.
    pub max_chars: usize,
}

/// `None` for the sentinel, empty output, or anything too long.
pub fn parse_backchannel(raw: &str, max_chars: usize) -> Option<String> {
    let text = unquote(raw);
    if text.is_empty() || text == BACKCHANNEL_SENTINEL || text == "…" {
        return None;
    }
    if text.chars().count() > max_chars {
        return None;
    }
    Some(text.to_string())
}

pub fn backchannel() -> CognitiveStep<BackchannelContext, Option<String>> {
    create_cognitive_step(BACKCHANNEL, |ctx: &BackchannelContext| {
        let instructions = format!(
            "{speaker} just said: \"{chunk}\"\n\
             Does {listener} make a tiny listening sound? Reply with 1 to 3 words \
             (like \"mm\", \"right\", \"oh, wow\") or exactly {sentinel} to stay silent.",
            speaker = ctx.speaker,
            chunk = ctx.chunk,
            listener = ctx.listener,
            sentinel = BACKCHANNEL_SENTINEL,
        );
        let max_chars = ctx.max_chars;

        StepSpec::new(move |_| MemoryEntry::system(instructions.clone()))
            .with_max_tokens(10)
            .with_post_process(move |memory, raw| {
                let said = parse_backchannel(raw, max_chars);
                let entry = MemoryEntry::assistant(said.as_deref().unwrap_or(BACKCHANNEL_SENTINEL))
                    .with_speaker(memory.soul_name())
                    .with_metadata("kind", "backchannel");
                Ok((entry, said))
            })
    })
}
