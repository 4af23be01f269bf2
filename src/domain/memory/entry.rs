//! Memory entries and the linearized messages sent to a language model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::{EntryId, Timestamp};

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions (guides model behavior).
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

/// A message in a linearized conversation, ready for a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// Optional speaker name (agent or visitor label).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Creates a new message.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// A dated entry in a soul's working memory.
///
/// Entries are values: once created they are never edited, only replaced
/// wholesale by region upserts or compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub created_at: Timestamp,
}

impl MemoryEntry {
    /// Creates a new freeform entry.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            role,
            content: content.into(),
            speaker: None,
            region: None,
            metadata: Map::new(),
            created_at: Timestamp::now(),
        }
    }

    /// Creates a system entry.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user entry.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant entry.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attributes the entry to a named speaker.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Attaches a metadata value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a metadata value, if present.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub(crate) fn in_region(mut self, region: Option<&str>) -> Self {
        self.region = region.map(str::to_string);
        self
    }

    /// Converts to the message shape sent to providers.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            name: self.speaker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn entry_without_role_fails_to_deserialize() {
        let json = r#"{"id":"6f1c3c2e-8a55-4a4e-9a0a-3f86a3e3b7a1","content":"hi","created_at":"2024-01-15T10:30:00Z"}"#;
        let result: Result<MemoryEntry, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn to_message_carries_speaker_as_name() {
        let entry = MemoryEntry::user("hello there").with_speaker("visitor");
        let message = entry.to_message();

        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.content, "hello there");
        assert_eq!(message.name.as_deref(), Some("visitor"));
    }

    #[test]
    fn metadata_is_retrievable() {
        let entry = MemoryEntry::assistant("ok").with_metadata("chunk_index", 2);
        assert_eq!(entry.metadata_value("chunk_index"), Some(&Value::from(2)));
    }

    #[test]
    fn message_without_name_omits_field() {
        let json = serde_json::to_string(&Message::system("be kind")).unwrap();
        assert!(!json.contains("name"));
    }
}
