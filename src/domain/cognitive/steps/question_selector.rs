//! Routes a listener question to the agent who should answer first.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::cognitive::step::{create_cognitive_step, CognitiveStep, StepSpec};
use crate::domain::dialogue::AgentId;
use crate::domain::memory::MemoryEntry;

use super::parse::{find_ignore_case, labelled_value};

pub const QUESTION_SELECTOR: &str = "question_selector";

#[derive(Debug, Clone)]
pub struct SelectorContext {
    pub question: String,
    pub topic: String,
    pub agent_a: String,
    pub agent_b: String,
    /// Used when neither name can be found in the output.
    pub fallback: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRouting {
    pub first_responder: AgentId,
    pub approach: String,
    /// True when the output named neither agent.
    pub fell_back: bool,
}

/// Picks the agent named on the `first:` line, else the earliest name in the
/// whole output, else the fallback.
pub fn parse_routing(raw: &str, agent_a: &str, agent_b: &str, fallback: AgentId) -> QuestionRouting {
    let earliest = |text: &str| -> Option<AgentId> {
        let a = find_ignore_case(text, agent_a);
        let b = find_ignore_case(text, agent_b);
        match (a, b) {
            (Some(a), Some(b)) => Some(if a <= b { AgentId::A } else { AgentId::B }),
            (Some(_), None) => Some(AgentId::A),
            (None, Some(_)) => Some(AgentId::B),
            (None, None) => None,
        }
    };

    let chosen = labelled_value(raw, "first")
        .and_then(|line| earliest(line))
        .or_else(|| earliest(raw));

    let approach = labelled_value(raw, "approach").unwrap_or_default().to_string();

    match chosen {
        Some(first_responder) => QuestionRouting {
            first_responder,
            approach,
            fell_back: false,
        },
        None => {
            warn!(output = raw, fallback = %fallback, "Question selector named no agent, using fallback");
            QuestionRouting {
                first_responder: fallback,
                approach,
                fell_back: true,
            }
        }
    }
}

pub fn question_selector() -> CognitiveStep<SelectorContext, QuestionRouting> {
    create_cognitive_step(QUESTION_SELECTOR, |ctx: &SelectorContext| {
        let instructions = format!(
            "A listener asked \"{question}\" during a conversation about \"{topic}\".\n\
             Who should answer first, {a} or {b}? Answer in exactly two lines:\n\
             first: <{a} or {b}>\n\
             approach: <one sentence on how to open the answer>",
            question = ctx.question,
            topic = ctx.topic,
            a = ctx.agent_a,
            b = ctx.agent_b,
        );
        let (agent_a, agent_b, fallback) = (ctx.agent_a.clone(), ctx.agent_b.clone(), ctx.fallback);

        StepSpec::new(move |_| MemoryEntry::system(instructions.clone()))
            .with_temperature(0.2)
            .with_post_process(move |memory, raw| {
                let routing = parse_routing(raw, &agent_a, &agent_b, fallback);
                let entry = MemoryEntry::assistant(raw.trim())
                    .with_speaker(memory.soul_name())
                    .with_metadata("first_responder", routing.first_responder.as_str());
                Ok((entry, routing))
            })
    })
}
