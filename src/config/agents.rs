//! Radio dialogue cast

use serde::Deserialize;

use crate::domain::dialogue::{AgentId, AgentProfile};

use super::error::ValidationError;

/// Names and personalities of the two dialogue voices
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_a_name")]
    pub a_name: String,

    #[serde(default = "default_a_personality")]
    pub a_personality: String,

    #[serde(default = "default_b_name")]
    pub b_name: String,

    #[serde(default = "default_b_personality")]
    pub b_personality: String,
}

impl AgentsConfig {
    /// Builds both profiles, A first.
    pub fn profiles(&self) -> Result<(AgentProfile, AgentProfile), ValidationError> {
        let invalid = |e: crate::domain::foundation::ValidationError| ValidationError::InvalidAgent(e.to_string());
        let a = AgentProfile::new(AgentId::A, &self.a_name, &self.a_personality).map_err(invalid)?;
        let b = AgentProfile::new(AgentId::B, &self.b_name, &self.b_personality).map_err(invalid)?;
        Ok((a, b))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.a_name.trim().eq_ignore_ascii_case(self.b_name.trim()) {
            return Err(ValidationError::InvalidAgent("agents need distinct names".to_string()));
        }
        self.profiles().map(|_| ())
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            a_name: default_a_name(),
            a_personality: default_a_personality(),
            b_name: default_b_name(),
            b_personality: default_b_personality(),
        }
    }
}

fn default_a_name() -> String {
    "Kothar".to_string()
}

fn default_a_personality() -> String {
    "A wry, ancient craftsman of the gods. Speaks plainly, loves a good riddle, \
     and is quick to puncture grand claims with practical questions."
        .to_string()
}

fn default_b_name() -> String {
    "Tamar".to_string()
}

fn default_b_personality() -> String {
    "A curious scholar of myth and memory. Warm, precise, and fond of tracing \
     an idea back to where it first appeared."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cast() {
        let (a, b) = AgentsConfig::default().profiles().unwrap();
        assert_eq!(a.name, "Kothar");
        assert_eq!(b.name, "Tamar");
        assert_eq!(b.id, AgentId::B);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = AgentsConfig {
            b_name: "kothar".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAgent(_))));
    }

    #[test]
    fn test_blank_name_rejected() {
        let config = AgentsConfig {
            a_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
