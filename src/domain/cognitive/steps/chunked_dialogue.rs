//! Generates one radio turn split at natural pause points.

use tracing::warn;

use crate::domain::cognitive::step::{create_cognitive_step, CognitiveStep, StepSpec};
use crate::domain::dialogue::ChunkedUtterance;
use crate::domain::memory::MemoryEntry;

pub const CHUNKED_DIALOGUE: &str = "chunked_dialogue";

/// Why the turn is being spoken.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPurpose {
    /// Continue the topic.
    Topic,
    /// Answer a listener question first.
    AnswerQuestion { question: String, approach: String },
    /// Follow up on the partner's answer to a listener question.
    FollowUp { question: String, partner_answer: String },
}

/// Everything the speaker needs to phrase its turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub speaker: String,
    pub partner: String,
    pub topic: String,
    pub partner_last_utterance: String,
    /// Unspoken remainder of this speaker's interrupted turn.
    pub interrupted_thought: Option<String>,
    pub purpose: TurnPurpose,
}

impl TurnContext {
    fn instructions(&self) -> String {
        let TurnContext {
            speaker,
            partner,
            topic,
            partner_last_utterance,
            ..
        } = self;

        let mut prompt = format!(
            "{speaker} is live on a radio show with {partner}, talking about \"{topic}\".\n\
             {partner} last said: \"{partner_last_utterance}\"\n"
        );

        if let Some(thought) = &self.interrupted_thought {
            prompt.push_str(&format!(
                "{speaker} was interrupted before saying: \"{thought}\". \
                 {speaker} may return to that thought or let it go.\n"
            ));
        }

        match &self.purpose {
            TurnPurpose::Topic => {}
            TurnPurpose::AnswerQuestion { question, approach } => {
                prompt.push_str(&format!(
                    "A listener asked: \"{question}\". {speaker} answers it first. Approach: {approach}\n"
                ));
            }
            TurnPurpose::FollowUp {
                question,
                partner_answer,
            } => {
                prompt.push_str(&format!(
                    "A listener asked: \"{question}\". {partner} answered: \"{partner_answer}\"\n\
                     {speaker} builds on, contrasts with, or extends that answer. Never restate it.\n"
                ));
            }
        }

        prompt.push_str(&format!(
            "Reply with only what {speaker} says next, in 2 to 4 segments separated by \" | \" \
             at natural pauses. Each segment is a complete thought of about 8 to 15 words; \
             never split mid-phrase."
        ));
        prompt
    }
}

/// Builds the chunked-dialogue step.
pub fn chunked_dialogue() -> CognitiveStep<TurnContext, ChunkedUtterance> {
    create_cognitive_step(CHUNKED_DIALOGUE, |context: &TurnContext| {
        let instructions = context.instructions();
        StepSpec::new(move |_| MemoryEntry::system(instructions.clone()))
            .with_temperature(0.9)
            .with_post_process(|memory, raw| {
                let utterance = ChunkedUtterance::parse(raw);
                if utterance.is_empty() {
                    warn!(soul = memory.soul_name(), "Chunked dialogue produced no speakable text");
                }
                let entry = MemoryEntry::assistant(utterance.cleaned.clone())
                    .with_speaker(memory.soul_name())
                    .with_metadata("chunks", utterance.chunks.len());
                Ok((entry, utterance))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(purpose: TurnPurpose) -> TurnContext {
        TurnContext {
            speaker: "Kothar".into(),
            partner: "Tamar".into(),
            topic: "origins of the labyrinth".into(),
            partner_last_utterance: "Daedalus built it for a king.".into(),
            interrupted_thought: None,
            purpose,
        }
    }

    #[test]
    fn topic_prompt_names_both_agents_and_the_delimiter() {
        let prompt = context(TurnPurpose::Topic).instructions();

        assert!(prompt.contains("Kothar is live on a radio show with Tamar"));
        assert!(prompt.contains("Daedalus built it"));
        assert!(prompt.contains("\" | \""));
        assert!(!prompt.contains("interrupted"));
    }

    #[test]
    fn interrupted_thought_is_offered_back() {
        let mut ctx = context(TurnPurpose::Topic);
        ctx.interrupted_thought = Some("the bull was a metaphor".into());

        assert!(ctx.instructions().contains("interrupted before saying: \"the bull was a metaphor\""));
    }

    #[test]
    fn follow_up_carries_partner_answer() {
        let prompt = context(TurnPurpose::FollowUp {
            question: "Was it real?".into(),
            partner_answer: "Knossos suggests so.".into(),
        })
        .instructions();

        assert!(prompt.contains("Tamar answered: \"Knossos suggests so.\""));
        assert!(prompt.contains("Never restate it"));
    }

    #[test]
    fn answer_prompt_carries_approach() {
        let prompt = context(TurnPurpose::AnswerQuestion {
            question: "Was it real?".into(),
            approach: "start with the archaeology".into(),
        })
        .instructions();

        assert!(prompt.contains("Kothar answers it first. Approach: start with the archaeology"));
    }
}
