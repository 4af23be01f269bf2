//! The two participants of a radio dialogue and their per-agent state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;
use crate::domain::memory::{MemoryEntry, WorkingMemory, CORE_REGION};

use super::intention::Intention;

/// Sentinel handed to prompts when the partner has not spoken yet.
pub const OPENING_SENTINEL: &str = "(opening the conversation)";

/// Identifies one of the two dialogue agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    A,
    B,
}

impl AgentId {
    /// The other participant.
    pub fn other(self) -> Self {
        match self {
            AgentId::A => AgentId::B,
            AgentId::B => AgentId::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::A => "a",
            AgentId::B => "b",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            AgentId::A => 0,
            AgentId::B => 1,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "agent_a" => Ok(AgentId::A),
            "b" | "agent_b" => Ok(AgentId::B),
            other => Err(ValidationError::invalid_format(
                "agent_id",
                format!("expected 'a' or 'b', got '{other}'"),
            )),
        }
    }
}

/// Display name and personality of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub personality: String,
}

impl AgentProfile {
    pub fn new(id: AgentId, name: impl Into<String>, personality: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        Ok(Self {
            id,
            name,
            personality: personality.into(),
        })
    }

    /// Fresh working memory seeded with the personality in the core region.
    pub fn initial_memory(&self) -> WorkingMemory {
        WorkingMemory::new(self.name.clone()).with_region(
            CORE_REGION,
            MemoryEntry::system(format!("You are {}. {}", self.name, self.personality)),
        )
    }
}

/// Everything the orchestrator tracks for one agent.
#[derive(Debug, Clone)]
pub struct SoulDialogueState {
    pub profile: AgentProfile,
    pub memory: WorkingMemory,
    pub intention: Option<Intention>,
    pub wants_to_speak: bool,
    pub urgency_level: f32,
    pub currently_vocalizing: bool,
    last_utterance: Option<String>,
}

impl SoulDialogueState {
    pub fn new(profile: AgentProfile) -> Self {
        let memory = profile.initial_memory();
        Self {
            profile,
            memory,
            intention: None,
            wants_to_speak: false,
            urgency_level: 0.0,
            currently_vocalizing: false,
            last_utterance: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.profile.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Full text of the pending intention, or empty when there is none.
    pub fn current_utterance(&self) -> &str {
        self.intention
            .as_ref()
            .map(|i| i.full_response.as_str())
            .unwrap_or("")
    }

    /// What this agent actually said in its last spoken turn.
    pub fn last_utterance(&self) -> &str {
        self.last_utterance.as_deref().unwrap_or(OPENING_SENTINEL)
    }

    pub(crate) fn set_last_utterance(&mut self, text: String) {
        if !text.trim().is_empty() {
            self.last_utterance = Some(text);
        }
    }
}
