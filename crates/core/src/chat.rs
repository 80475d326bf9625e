//! Chat message record and text validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

/// Maximum length of a single chat message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4_000;

/// A chat message as stored. Messages are never edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: EntityId,
    pub incident_id: EntityId,
    pub sender_id: EntityId,
    pub message: String,
    /// Sole ordering key within an incident's stream.
    pub created_at: Timestamp,
}

/// DTO for inserting a message; `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub incident_id: EntityId,
    pub sender_id: EntityId,
    pub message: String,
}

/// Trim and validate message text.
pub fn normalize_message(text: &str) -> Result<String, CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Message must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Message exceeds maximum length of {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Order messages by `created_at`, breaking ties by id.
pub fn sort_messages(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(normalize_message("  on my way \n").unwrap(), "on my way");
    }

    #[test]
    fn blank_message_rejected() {
        assert!(normalize_message("").is_err());
        assert!(normalize_message(" \t\n").is_err());
    }

    #[test]
    fn overlong_message_rejected() {
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(normalize_message(&long).is_err());
        assert!(normalize_message(&"x".repeat(MAX_MESSAGE_LENGTH)).is_ok());
    }

    #[test]
    fn sorts_by_creation_then_id() {
        let incident_id = Uuid::new_v4();
        let t0 = chrono::Utc::now();
        let mk = |at, text: &str| ChatMessage {
            id: Uuid::new_v4(),
            incident_id,
            sender_id: Uuid::new_v4(),
            message: text.into(),
            created_at: at,
        };
        let mut messages = vec![
            mk(t0 + chrono::Duration::seconds(2), "third"),
            mk(t0, "first"),
            mk(t0 + chrono::Duration::seconds(1), "second"),
        ];
        sort_messages(&mut messages);
        let texts: Vec<_> = messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }
}
