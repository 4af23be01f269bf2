//! Concrete cognitive steps.
//!
//! Each step owns its prompt and a lenient parser for the output shape the
//! callers depend on.

mod backchannel;
mod chunked_dialogue;
mod conversation;
mod interruption;
mod parse;
mod question_selector;

pub use backchannel::{backchannel, parse_backchannel, BackchannelContext, BACKCHANNEL, BACKCHANNEL_SENTINEL};
pub use chunked_dialogue::{chunked_dialogue, TurnContext, TurnPurpose, CHUNKED_DIALOGUE};
pub use conversation::{
    decision, external_dialog, internal_monologue, parse_choice, summarize, DecisionArgs, DECISION,
    EXTERNAL_DIALOG, INTERNAL_MONOLOGUE, SUMMARIZE,
};
pub use interruption::{
    interruption_decision, parse_decision, parse_urgency, InterruptionContext, InterruptionDecision,
    INTERRUPTION_DECISION,
};
pub use question_selector::{parse_routing, question_selector, QuestionRouting, SelectorContext, QUESTION_SELECTOR};
