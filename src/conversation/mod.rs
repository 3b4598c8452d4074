//! Conversation types and state management

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Turn {index} has empty content")]
    EmptyTurn { index: usize },
}

/// Ordered dialogue, persisted as a bare JSON array of role/content pairs.
///
/// Turns are only ever appended; order is replayed verbatim to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.turns.push(Turn::assistant(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Reject conversations carrying empty turns (used for client-supplied history).
    pub fn validate(&self) -> Result<(), ConversationError> {
        match self
            .turns
            .iter()
            .position(|t| t.content.trim().is_empty())
        {
            Some(index) => Err(ConversationError::EmptyTurn { index }),
            None => Ok(()),
        }
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

/// Storage key helpers
pub struct ConversationKey;

impl ConversationKey {
    /// Per-user key layout used by the authenticated deployment
    pub fn for_user(user_id: &str) -> String {
        format!("conversations/{}_history.json", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_bare_array() {
        let mut conversation = Conversation::new();
        conversation.push_user("I keep losing focus");
        conversation.push_assistant("That sounds frustrating.");

        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "user", "content": "I keep losing focus"},
                {"role": "assistant", "content": "That sounds frustrating."}
            ])
        );
    }

    #[test]
    fn test_parse_stored_history() {
        let raw = r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello?"}]"#;
        let conversation: Conversation = serde_json::from_str(raw).unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[1], Turn::assistant("hello?"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let raw = r#"[{"role":"system","content":"x"}]"#;
        assert!(serde_json::from_str::<Conversation>(raw).is_err());
    }

    #[test]
    fn test_validate_empty_turn() {
        let conversation = Conversation::from(vec![Turn::user("ok"), Turn::assistant("  ")]);
        assert_eq!(
            conversation.validate(),
            Err(ConversationError::EmptyTurn { index: 1 })
        );
    }

    #[test]
    fn test_user_key() {
        assert_eq!(
            ConversationKey::for_user("sam"),
            "conversations/sam_history.json"
        );
    }
}
