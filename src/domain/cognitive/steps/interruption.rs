//! Decides how badly the listener wants to cut in.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::cognitive::step::{create_cognitive_step, CognitiveStep, StepSpec};
use crate::domain::memory::MemoryEntry;

use super::parse::{find_ignore_case, first_number, labelled_value};

pub const INTERRUPTION_DECISION: &str = "interruption_decision";

#[derive(Debug, Clone)]
pub struct InterruptionContext {
    pub listener: String,
    pub speaker: String,
    pub topic: String,
    pub current_chunk: String,
    pub spoken_so_far: String,
    /// What the listener was already planning to say.
    pub own_pending: Option<String>,
}

/// Normalized urgency in `[0, 1]` plus what the listener would say.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionDecision {
    pub urgency: f32,
    pub interjection: String,
}

/// Reads an urgency, preferring a number after the word "urgency".
///
/// Values above 1 are read as a 0-10 or 0-100 scale. `None` when no number
/// is present.
pub fn parse_urgency(raw: &str) -> Option<f32> {
    let labelled = find_ignore_case(raw, "urgency").and_then(|pos| first_number(&raw[pos..]));
    labelled.or_else(|| first_number(raw)).map(normalize)
}

fn normalize(value: f32) -> f32 {
    let scaled = if value <= 1.0 {
        value
    } else if value <= 10.0 {
        value / 10.0
    } else if value <= 100.0 {
        value / 100.0
    } else {
        1.0
    };
    scaled.clamp(0.0, 1.0)
}

/// Parses the model output; unreadable urgency counts as zero.
pub fn parse_decision(raw: &str) -> InterruptionDecision {
    let urgency = parse_urgency(raw).unwrap_or_else(|| {
        warn!(output = raw, "Unparseable interruption urgency, treating as 0");
        0.0
    });

    let interjection = labelled_value(raw, "interjection")
        .map(str::to_string)
        .or_else(|| {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && find_ignore_case(line, "urgency").is_none())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_default();

    InterruptionDecision {
        urgency,
        interjection,
    }
}

pub fn interruption_decision() -> CognitiveStep<InterruptionContext, InterruptionDecision> {
    create_cognitive_step(INTERRUPTION_DECISION, |ctx: &InterruptionContext| {
        let pending = ctx
            .own_pending
            .as_deref()
            .map(|p| format!("{} was planning to say: \"{p}\"\n", ctx.listener))
            .unwrap_or_default();
        let instructions = format!(
            "{listener} is listening to {speaker} on a radio show about \"{topic}\".\n\
             So far {speaker} said: \"{so_far}\"\n\
             {speaker} is now saying: \"{chunk}\"\n\
             {pending}\
             How urgently does {listener} need to interrupt right now?\n\
             Answer in exactly two lines:\n\
             urgency: <number from 0.0 (no need) to 1.0 (must interrupt)>\n\
             interjection: <the few words {listener} would open with>",
            listener = ctx.listener,
            speaker = ctx.speaker,
            topic = ctx.topic,
            so_far = ctx.spoken_so_far,
            chunk = ctx.current_chunk,
        );

        StepSpec::new(move |_| MemoryEntry::system(instructions.clone()))
            .with_temperature(0.3)
            .with_max_tokens(80)
            .with_post_process(|memory, raw| {
                let decision = parse_decision(raw);
                let entry = MemoryEntry::assistant(format!(
                    "{} weighed interrupting (urgency {:.2}): {}",
                    memory.soul_name(),
                    decision.urgency,
                    decision.interjection
                ))
                .with_speaker(memory.soul_name())
                .with_metadata("urgency", f64::from(decision.urgency));
                Ok((entry, decision))
            })
    })
}
