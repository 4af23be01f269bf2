use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Where the orchestrator is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    Idle,
    /// Between turns; the loop is live.
    Running,
    Generating,
    Vocalizing,
    Interrupted,
    Switching,
    AnsweringQuestion,
    Stopped,
}

impl StateMachine for DialoguePhase {
    fn valid_transitions(&self) -> Vec<Self> {
        use DialoguePhase::*;
        match self {
            Idle => vec![Generating, Stopped],
            Generating => vec![Running, Stopped],
            Running => vec![Vocalizing, Switching, Generating, AnsweringQuestion, Stopped],
            Vocalizing => vec![Interrupted, Running, Stopped],
            Interrupted => vec![Generating, Stopped],
            Switching => vec![Generating, Stopped],
            AnsweringQuestion => vec![Generating, Stopped],
            Stopped => vec![Idle],
        }
    }
}

impl DialoguePhase {
    /// True while the loop owns the floor.
    pub fn is_active(&self) -> bool {
        !matches!(self, DialoguePhase::Idle | DialoguePhase::Stopped)
    }
}
