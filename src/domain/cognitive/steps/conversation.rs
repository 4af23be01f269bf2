//! General-purpose steps for the visitor chat soul: speaking, thinking,
//! choosing and summarizing.

use serde_json::Value;
use tracing::warn;

use crate::domain::cognitive::step::{create_cognitive_step, CognitiveStep, StepSpec};
use crate::domain::cognitive::StepError;
use crate::domain::memory::MemoryEntry;

use super::parse::find_ignore_case;

pub const EXTERNAL_DIALOG: &str = "external_dialog";
pub const INTERNAL_MONOLOGUE: &str = "internal_monologue";
pub const DECISION: &str = "decision";
pub const SUMMARIZE: &str = "summarize";

/// What the soul says out loud. The result is the raw reply.
pub fn external_dialog() -> CognitiveStep<String, String> {
    create_cognitive_step(EXTERNAL_DIALOG, |instructions: &String| {
        let instructions = instructions.clone();
        StepSpec::new(move |memory| {
            let soul = memory.soul_name();
            MemoryEntry::system(format!(
                "Model what {soul} says next.\n\
                 ## Instructions\n{instructions}\n\
                 Reply with only the words {soul} speaks, no stage directions."
            ))
        })
    })
}

/// A private thought, remembered but never shown to the visitor.
pub fn internal_monologue() -> CognitiveStep<String, String> {
    create_cognitive_step(INTERNAL_MONOLOGUE, |instructions: &String| {
        let instructions = instructions.clone();
        StepSpec::new(move |memory| {
            let soul = memory.soul_name();
            MemoryEntry::system(format!(
                "Model {soul}'s private thought. {instructions}\n\
                 Reply with one or two sentences of inner monologue only."
            ))
        })
        .with_post_process(|memory, raw| {
            let thought = raw.trim().to_string();
            let entry = MemoryEntry::assistant(format!("{} thought: {thought}", memory.soul_name()))
                .with_speaker(memory.soul_name())
                .with_metadata("kind", INTERNAL_MONOLOGUE);
            Ok((entry, thought))
        })
    })
}

/// Arguments for choosing one option out of a fixed list.
#[derive(Debug, Clone)]
pub struct DecisionArgs {
    pub description: String,
    pub choices: Vec<String>,
    /// Returned when the output names no choice.
    pub fallback: String,
}

/// The choice mentioned earliest in `raw`; longer names win ties.
pub fn parse_choice(raw: &str, choices: &[String]) -> Option<String> {
    choices
        .iter()
        .filter_map(|choice| find_ignore_case(raw, choice).map(|pos| (pos, choice)))
        .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then_with(|| b.len().cmp(&a.len())))
        .map(|(_, choice)| choice.clone())
}

pub fn decision() -> CognitiveStep<DecisionArgs, String> {
    create_cognitive_step(DECISION, |args: &DecisionArgs| {
        let DecisionArgs {
            description,
            choices,
            fallback,
        } = args.clone();
        let listed = choices.join(", ");

        StepSpec::new(move |memory| {
            MemoryEntry::system(format!(
                "{} decides: {description}\nChoose exactly one of: {listed}.\nReply with the choice only.",
                memory.soul_name()
            ))
        })
        .with_temperature(0.0)
        .with_max_tokens(20)
        .with_post_process(move |memory, raw| {
            if choices.is_empty() {
                return Err(StepError::post_process(DECISION, "no choices offered"));
            }
            let choice = parse_choice(raw, &choices).unwrap_or_else(|| {
                warn!(output = raw, fallback = %fallback, "Decision named no choice, using fallback");
                fallback.clone()
            });
            let entry = MemoryEntry::assistant(format!("{} decided: {choice}", memory.soul_name()))
                .with_speaker(memory.soul_name())
                .with_metadata("kind", DECISION)
                .with_metadata("choice", Value::String(choice.clone()));
            Ok((entry, choice))
        })
    })
}

/// Summary of the conversation so far, from the soul's point of view.
pub fn summarize() -> CognitiveStep<String, String> {
    create_cognitive_step(SUMMARIZE, |focus: &String| {
        let focus = focus.clone();
        StepSpec::new(move |memory| {
            let soul = memory.soul_name();
            let focus = if focus.is_empty() {
                String::new()
            } else {
                format!(" Focus on {focus}.")
            };
            MemoryEntry::system(format!(
                "Summarize the conversation so far as {soul} would remember it, \
                 in at most five sentences.{focus} Keep names, open questions and promises."
            ))
        })
        .with_temperature(0.2)
        .with_post_process(|memory, raw| {
            let summary = raw.trim().to_string();
            if summary.is_empty() {
                return Err(StepError::post_process(SUMMARIZE, "empty summary"));
            }
            let entry = MemoryEntry::assistant(summary.clone())
                .with_speaker(memory.soul_name())
                .with_metadata("kind", SUMMARIZE);
            Ok((entry, summary))
        })
    })
}
